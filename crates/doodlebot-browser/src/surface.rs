//! The injected canvas control surface.
//!
//! A single script, injected once per attach, defines every drawing operation
//! inside the page. Each call resolves the canvas target by selector at call
//! time and answers `{ok: true}` or `{error: reason}` — nothing throws across
//! the evaluate seam. The Rust side builds one dispatch expression per
//! [`DrawCommand`] and maps `{error}` replies to [`DoodleBotError::Surface`].

use std::collections::HashMap;

use serde_json::{Value, json};

use doodlebot_core::command::DrawCommand;
use doodlebot_core::error::{DoodleBotError, Result};

const SURFACE_JS: &str = r#"(() => {
  window.__doodlebot = {
    target: __TARGET__,
    dispatch(op, a) {
      try {
        if (op === 'click') {
          const btn = document.querySelector(a.selector);
          if (!btn) return { error: 'tool control not found: ' + a.selector };
          btn.click();
          return { ok: true };
        }
        const el = document.querySelector(this.target);
        if (!el) return { error: 'canvas target not found: ' + this.target };
        const ctx = el.getContext('2d');
        switch (op) {
          case 'drawLine': {
            ctx.strokeStyle = a.color;
            ctx.lineWidth = a.width;
            ctx.lineCap = 'round';
            ctx.beginPath();
            ctx.moveTo(a.x1, a.y1);
            ctx.lineTo(a.x2, a.y2);
            ctx.stroke();
            return { ok: true };
          }
          case 'drawCircle': {
            ctx.strokeStyle = a.color;
            ctx.fillStyle = a.color;
            ctx.beginPath();
            ctx.arc(a.x, a.y, a.radius, 0, Math.PI * 2);
            if (a.filled) ctx.fill();
            ctx.stroke();
            return { ok: true };
          }
          case 'drawRect': {
            if (a.filled) {
              ctx.fillStyle = a.color;
              ctx.fillRect(a.x, a.y, a.w, a.h);
            } else {
              ctx.strokeStyle = a.color;
              ctx.strokeRect(a.x, a.y, a.w, a.h);
            }
            return { ok: true };
          }
          case 'drawStroke': {
            ctx.strokeStyle = a.color;
            ctx.lineWidth = a.width;
            ctx.lineCap = 'round';
            ctx.lineJoin = 'round';
            ctx.beginPath();
            ctx.moveTo(a.points[0].x, a.points[0].y);
            for (const p of a.points.slice(1)) ctx.lineTo(p.x, p.y);
            ctx.stroke();
            return { ok: true };
          }
          case 'clear': {
            ctx.clearRect(0, 0, el.width, el.height);
            return { ok: true };
          }
          default:
            return { error: 'unknown operation: ' + op };
        }
      } catch (e) {
        return { error: String(e) };
      }
    }
  };
  return true;
})()"#;

fn json_quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// The injection script with the canvas selector baked in.
pub fn injection_script(selector: &str) -> String {
    SURFACE_JS.replace("__TARGET__", &json_quote(selector))
}

/// Expression probing whether the canvas target exists yet.
pub fn target_probe(selector: &str) -> String {
    format!("document.querySelector({}) !== null", json_quote(selector))
}

/// Map a command to its surface operation name and JSON arguments.
///
/// `ToolSelect` resolves against the attach-time tool table here, so an
/// unknown tool name fails before anything is clicked.
pub fn operation(
    command: &DrawCommand,
    tools: &HashMap<String, String>,
) -> Result<(&'static str, Value)> {
    match command {
        DrawCommand::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            width,
        } => Ok((
            "drawLine",
            json!({ "x1": x1, "y1": y1, "x2": x2, "y2": y2, "color": color, "width": width }),
        )),
        DrawCommand::Circle {
            x,
            y,
            radius,
            color,
            filled,
        } => Ok((
            "drawCircle",
            json!({ "x": x, "y": y, "radius": radius, "color": color, "filled": filled }),
        )),
        DrawCommand::Rect {
            x,
            y,
            w,
            h,
            color,
            filled,
        } => Ok((
            "drawRect",
            json!({ "x": x, "y": y, "w": w, "h": h, "color": color, "filled": filled }),
        )),
        DrawCommand::Stroke {
            points,
            color,
            width,
        } => Ok((
            "drawStroke",
            json!({ "points": points, "color": color, "width": width }),
        )),
        DrawCommand::Clear => Ok(("clear", json!({}))),
        DrawCommand::ToolSelect { name } => {
            let selector = tools
                .get(name)
                .ok_or_else(|| DoodleBotError::Surface(format!("unknown tool: {name}")))?;
            Ok(("click", json!({ "selector": selector })))
        }
    }
}

/// The dispatch expression for one operation.
pub fn call_expr(op: &str, args: &Value) -> String {
    format!("window.__doodlebot.dispatch({}, {})", json_quote(op), args)
}

/// Interpret a surface reply.
pub fn parse_result(value: &Value) -> Result<()> {
    if let Some(reason) = value.get("error").and_then(Value::as_str) {
        return Err(DoodleBotError::Surface(reason.to_string()));
    }
    if value.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    Err(DoodleBotError::Surface(format!(
        "unexpected surface reply: {value}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doodlebot_core::command::Point;

    fn tools() -> HashMap<String, String> {
        [("eraser".to_string(), ".tool-eraser".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_injection_script_embeds_selector() {
        let script = injection_script(".main-canvas");
        assert!(script.contains(r#"target: ".main-canvas""#));
        assert!(!script.contains("__TARGET__"));
    }

    #[test]
    fn test_target_probe_quotes_selector() {
        assert_eq!(
            target_probe("#board"),
            r##"document.querySelector("#board") !== null"##
        );
    }

    #[test]
    fn test_line_operation_args() {
        let cmd = DrawCommand::Line {
            x1: 1.0,
            y1: 2.0,
            x2: 3.0,
            y2: 4.0,
            color: "#fff".into(),
            width: 2.0,
        };
        let (op, args) = operation(&cmd, &tools()).unwrap();
        assert_eq!(op, "drawLine");
        assert_eq!(args["x2"], 3.0);
        assert_eq!(args["color"], "#fff");
    }

    #[test]
    fn test_stroke_operation_serializes_points() {
        let cmd = DrawCommand::Stroke {
            points: vec![Point { x: 0.0, y: 0.0 }, Point { x: 5.0, y: 5.0 }],
            color: "#000000".into(),
            width: 2.0,
        };
        let (op, args) = operation(&cmd, &tools()).unwrap();
        assert_eq!(op, "drawStroke");
        assert_eq!(args["points"][1]["x"], 5.0);
    }

    #[test]
    fn test_tool_select_resolves_table() {
        let cmd = DrawCommand::ToolSelect {
            name: "eraser".into(),
        };
        let (op, args) = operation(&cmd, &tools()).unwrap();
        assert_eq!(op, "click");
        assert_eq!(args["selector"], ".tool-eraser");
    }

    #[test]
    fn test_unknown_tool_fails_without_click() {
        let cmd = DrawCommand::ToolSelect {
            name: "chainsaw".into(),
        };
        let err = operation(&cmd, &tools()).unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[test]
    fn test_call_expr_shape() {
        let expr = call_expr("clear", &json!({}));
        assert_eq!(expr, r#"window.__doodlebot.dispatch("clear", {})"#);
    }

    #[test]
    fn test_parse_result() {
        assert!(parse_result(&json!({ "ok": true })).is_ok());
        let err = parse_result(&json!({ "error": "no canvas" })).unwrap_err();
        assert!(err.to_string().contains("no canvas"));
        assert!(parse_result(&json!(null)).is_err());
    }
}
