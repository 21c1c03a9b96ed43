//! Headless-browser session control for the remote canvas.
//!
//! Owns the single page handle, injects the control surface into the loaded
//! drawing page, and captures the canvas as a compressed image. The CDP
//! implementation requires the `browser` feature flag and Chrome/Chromium
//! installed; everything above the [`backend`] seam is backend-agnostic.

pub mod backend;
pub mod capture;
pub mod session;
pub mod surface;

pub use session::SessionManager;

#[cfg(feature = "browser")]
pub use backend::chromium::ChromiumBackend;
