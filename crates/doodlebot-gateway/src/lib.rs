//! Message dispatching and the HTTP liveness endpoint.
//!
//! The dispatcher is the only place chat text meets the canvas session:
//! it classifies each inbound message, runs it against the [`CanvasHost`],
//! and produces the reply to send back. The liveness endpoint reports
//! whether a session is currently attached.
//!
//! [`CanvasHost`]: doodlebot_core::session::CanvasHost

pub mod dispatch;
pub mod server;

pub use dispatch::{Dispatcher, Reply};
pub use server::{router, start_server};
