//! Session lifecycle model and the canvas host seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::DrawCommand;
use crate::error::Result;

/// Lifecycle of the single remote-page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No page attached.
    #[default]
    Empty,
    /// An attach is in flight.
    Attaching,
    /// Page loaded, canvas target found, control surface injected.
    Ready,
    /// The last attach failed; no usable handle remains.
    Failed,
}

impl SessionState {
    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }
}

/// The dispatcher's view of the browser session.
///
/// Drawing and capture are only valid while the session is [`SessionState::Ready`];
/// implementations must fail such calls without touching remote state otherwise.
/// `draw` applies one command and captures the resulting canvas in a single
/// exclusive sequence, so a concurrent attach cannot interleave between the
/// mutation and its screenshot.
#[async_trait]
pub trait CanvasHost: Send + Sync + 'static {
    /// Load `url`, wait for the canvas target, and establish the control
    /// surface. Replaces any live session (old handle released first).
    async fn attach(&self, url: &str) -> Result<()>;

    /// Release the page handle unconditionally.
    async fn detach(&self);

    async fn state(&self) -> SessionState;

    /// Apply one drawing command and return the resulting canvas as JPEG bytes.
    async fn draw(&self, command: &DrawCommand) -> Result<Vec<u8>>;

    /// Capture the canvas without mutating it.
    async fn capture(&self) -> Result<Vec<u8>>;
}
