//! Channel abstraction and the Telegram implementation.
//!
//! A channel turns a messaging platform into a stream of [`InboundMessage`]s
//! and a sink for [`OutboundMessage`]s. The bot runs exactly one channel, but
//! everything above this crate only sees the [`Channel`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use doodlebot_core::types::{InboundMessage, OutboundMessage, SendResult};

pub mod telegram;

/// Channel metadata for display and discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub label: String,
    pub description: String,
    pub docs_url: Option<String>,
}

/// Channel health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub connected: bool,
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub error: Option<String>,
}

/// Handle to stop a running channel.
pub struct ChannelHandle {
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl ChannelHandle {
    pub fn new(shutdown_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Receiver for inbound messages from a channel.
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundMessage>;

/// Sender for inbound messages (used by channel implementations).
pub type InboundSender = mpsc::UnboundedSender<InboundMessage>;

/// The core channel trait.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Unique channel identifier (e.g., "telegram").
    fn id(&self) -> &str;

    /// Channel metadata for display.
    fn meta(&self) -> ChannelMeta;

    /// Start monitoring for inbound messages.
    /// Returns a receiver for inbound messages and a handle to stop monitoring.
    async fn start(&self) -> anyhow::Result<(InboundReceiver, ChannelHandle)>;

    /// Send a message to a chat on this channel.
    async fn send(&self, chat_id: &str, message: OutboundMessage) -> anyhow::Result<SendResult>;

    /// Signal that the bot is working on a reply, where the platform
    /// supports it.
    async fn set_typing(&self, chat_id: &str) -> anyhow::Result<()>;

    /// Get current channel status/health.
    async fn status(&self) -> ChannelStatus;
}
