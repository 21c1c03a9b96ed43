use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender identity from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
}

/// Inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: String,
    pub sender: Sender,
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outbound reply: plain text, a photo attachment, or both
/// (text becomes the photo caption when both are set).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: Option<String>,
    /// JPEG-encoded photo bytes.
    pub photo: Option<Vec<u8>>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            photo: None,
        }
    }

}

/// Result of sending a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub message_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}
