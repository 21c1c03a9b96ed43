//! Inbound message dispatcher.
//!
//! Classifies each message as a URL (attach), a draw command, a capture
//! request, or chatter, and turns the outcome into a [`Reply`]. Draw
//! commands only reach the session once it is ready; everything else gets
//! a textual nudge.

use std::sync::Arc;

use tracing::{debug, info, warn};

use doodlebot_core::command::{self, is_draw_keyword, normalize_keyword};
use doodlebot_core::session::CanvasHost;
use doodlebot_core::types::{InboundMessage, OutboundMessage};

pub const HELP: &str = "\
Send me a URL of a drawing page to attach to its canvas, then:

line x1 y1 x2 y2 [color] [width]
circle x y radius [color] [filled]
rect x y w h [color] [filled]
stroke [{\"x\":0,\"y\":0},...] [color] [width]
tool <name>
clear
pic (current canvas picture)";

pub const NOT_ATTACHED: &str = "No canvas attached. Send me a URL first.";

/// What the bot should send back, if anything.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Photo {
        caption: Option<String>,
        jpeg: Vec<u8>,
    },
    /// Nothing worth answering (empty or non-text message).
    Ignore,
}

impl Reply {
    pub fn into_outbound(self) -> Option<OutboundMessage> {
        match self {
            Reply::Text(text) => Some(OutboundMessage::text(text)),
            Reply::Photo { caption, jpeg } => Some(OutboundMessage {
                text: caption,
                photo: Some(jpeg),
            }),
            Reply::Ignore => None,
        }
    }
}

pub struct Dispatcher {
    host: Arc<dyn CanvasHost>,
}

impl Dispatcher {
    pub fn new(host: Arc<dyn CanvasHost>) -> Self {
        Self { host }
    }

    pub async fn handle(&self, msg: &InboundMessage) -> Reply {
        let Some(text) = msg.text.as_deref() else {
            return Reply::Ignore;
        };
        let text = text.trim();
        if text.is_empty() {
            return Reply::Ignore;
        }

        if text.starts_with("http://") || text.starts_with("https://") {
            return self.attach(text).await;
        }

        let first = text.split_whitespace().next().unwrap_or_default();
        let keyword = normalize_keyword(first);
        match keyword.as_str() {
            "start" | "help" => Reply::Text(HELP.to_string()),
            "pic" => self.capture_reply().await,
            k if is_draw_keyword(k) => self.draw(text).await,
            _ => {
                debug!(keyword, "unrecognized message, replying with help");
                Reply::Text(HELP.to_string())
            }
        }
    }

    async fn attach(&self, url: &str) -> Reply {
        info!(url, "attach requested");
        if let Err(e) = self.host.attach(url).await {
            warn!(url, error = %e, "attach failed");
            return Reply::Text(format!("Could not attach: {e}"));
        }
        match self.host.capture().await {
            Ok(jpeg) => Reply::Photo {
                caption: Some("Attached. Here is the canvas.".to_string()),
                jpeg,
            },
            Err(e) => {
                warn!(error = %e, "capture after attach failed");
                Reply::Text("Attached to the canvas.".to_string())
            }
        }
    }

    async fn capture_reply(&self) -> Reply {
        if !self.host.state().await.is_ready() {
            return Reply::Text(NOT_ATTACHED.to_string());
        }
        match self.host.capture().await {
            Ok(jpeg) => Reply::Photo {
                caption: None,
                jpeg,
            },
            Err(e) => Reply::Text(format!("Capture failed: {e}")),
        }
    }

    async fn draw(&self, text: &str) -> Reply {
        let cmd = match command::parse(text) {
            Ok(cmd) => cmd,
            // Parse errors are usage strings, sent verbatim
            Err(e) => return Reply::Text(e.to_string()),
        };
        if !self.host.state().await.is_ready() {
            return Reply::Text(NOT_ATTACHED.to_string());
        }
        match self.host.draw(&cmd).await {
            Ok(jpeg) => Reply::Photo {
                caption: None,
                jpeg,
            },
            Err(e) => Reply::Text(format!("Draw failed: {e}")),
        }
    }
}
