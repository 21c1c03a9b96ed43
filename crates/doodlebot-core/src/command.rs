//! Chat command grammar — one line of text to one typed drawing instruction.
//!
//! Numeric arguments coerce permissively: unparsable numeric text becomes `0`,
//! matching the `+x` coercion the drawing page itself applies. Argument counts
//! are validated before parsing, so *missing* arguments surface as usage
//! errors rather than silent zeros.

use serde::{Deserialize, Serialize};

use crate::error::{DoodleBotError, Result};

pub const DEFAULT_COLOR: &str = "#000000";
pub const DEFAULT_WIDTH: f64 = 2.0;

pub const USAGE_LINE: &str = "usage: /line x1 y1 x2 y2 [color] [width]";
pub const USAGE_CIRCLE: &str = "usage: /circle x y radius [color] [fill:true|false]";
pub const USAGE_RECT: &str = "usage: /rect x y w h [color] [fill:true|false]";
pub const USAGE_STROKE: &str =
    r#"usage: /stroke [{"x":0,"y":0},{"x":10,"y":10}] [color] [width]"#;
pub const USAGE_TOOL: &str = "usage: /tool <name>";

/// A point on the remote canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One typed drawing instruction, ready to cross the evaluate seam as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: String,
        width: f64,
    },
    Circle {
        x: f64,
        y: f64,
        radius: f64,
        color: String,
        filled: bool,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: String,
        filled: bool,
    },
    Stroke {
        points: Vec<Point>,
        color: String,
        width: f64,
    },
    Clear,
    ToolSelect {
        name: String,
    },
}

/// Strip the leading slash and any `@botname` suffix from a command token.
pub fn normalize_keyword(token: &str) -> String {
    let token = token.strip_prefix('/').unwrap_or(token);
    let token = token.split('@').next().unwrap_or(token);
    token.to_ascii_lowercase()
}

/// Whether `keyword` names a drawing command handled by [`parse`].
pub fn is_draw_keyword(keyword: &str) -> bool {
    matches!(
        keyword,
        "line" | "circle" | "rect" | "stroke" | "clear" | "tool"
    )
}

/// Parse one line of chat text into a [`DrawCommand`].
pub fn parse(line: &str) -> Result<DrawCommand> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match normalize_keyword(head).as_str() {
        "line" => parse_line(&args_of(rest)),
        "circle" => parse_circle(&args_of(rest)),
        "rect" => parse_rect(&args_of(rest)),
        "stroke" => parse_stroke(rest),
        "clear" => Ok(DrawCommand::Clear),
        "tool" => parse_tool(&args_of(rest)),
        other => Err(DoodleBotError::Parse(format!("unknown command: {other}"))),
    }
}

fn args_of(rest: &str) -> Vec<&str> {
    rest.split_whitespace().collect()
}

fn coerce(token: &str) -> f64 {
    token.parse().unwrap_or(0.0)
}

fn parse_line(args: &[&str]) -> Result<DrawCommand> {
    if args.len() < 4 {
        return Err(DoodleBotError::Parse(USAGE_LINE.into()));
    }
    Ok(DrawCommand::Line {
        x1: coerce(args[0]),
        y1: coerce(args[1]),
        x2: coerce(args[2]),
        y2: coerce(args[3]),
        color: args.get(4).map_or_else(|| DEFAULT_COLOR.into(), |s| s.to_string()),
        width: args.get(5).map_or(DEFAULT_WIDTH, |s| coerce(s)),
    })
}

fn parse_circle(args: &[&str]) -> Result<DrawCommand> {
    if args.len() < 3 {
        return Err(DoodleBotError::Parse(USAGE_CIRCLE.into()));
    }
    Ok(DrawCommand::Circle {
        x: coerce(args[0]),
        y: coerce(args[1]),
        radius: coerce(args[2]),
        color: args.get(3).map_or_else(|| DEFAULT_COLOR.into(), |s| s.to_string()),
        filled: args.get(4).is_some_and(|s| *s == "true"),
    })
}

fn parse_rect(args: &[&str]) -> Result<DrawCommand> {
    if args.len() < 4 {
        return Err(DoodleBotError::Parse(USAGE_RECT.into()));
    }
    Ok(DrawCommand::Rect {
        x: coerce(args[0]),
        y: coerce(args[1]),
        w: coerce(args[2]),
        h: coerce(args[3]),
        color: args.get(4).map_or_else(|| DEFAULT_COLOR.into(), |s| s.to_string()),
        filled: args.get(5).is_some_and(|s| *s == "true"),
    })
}

fn parse_stroke(rest: &str) -> Result<DrawCommand> {
    if rest.is_empty() {
        return Err(DoodleBotError::Parse(USAGE_STROKE.into()));
    }
    // Stream-deserialize so positional optionals can follow the JSON array.
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Vec<Point>>();
    let points = match stream.next() {
        Some(Ok(points)) => points,
        _ => return Err(DoodleBotError::Parse("invalid json".into())),
    };
    if points.len() < 2 {
        return Err(DoodleBotError::Parse("need at least two points".into()));
    }
    let tail = args_of(&rest[stream.byte_offset()..]);
    Ok(DrawCommand::Stroke {
        points,
        color: tail.first().map_or_else(|| DEFAULT_COLOR.into(), |s| s.to_string()),
        width: tail.get(1).map_or(DEFAULT_WIDTH, |s| coerce(s)),
    })
}

fn parse_tool(args: &[&str]) -> Result<DrawCommand> {
    match args.first() {
        Some(name) => Ok(DrawCommand::ToolSelect {
            name: name.to_ascii_lowercase(),
        }),
        None => Err(DoodleBotError::Parse(USAGE_TOOL.into())),
    }
}
