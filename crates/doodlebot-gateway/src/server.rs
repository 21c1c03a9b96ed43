//! HTTP liveness endpoint.
//!
//! A minimal axum server answering `/` and `/health` with the session state,
//! so process supervisors can tell "up and attached" from "up and idle".

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;

use doodlebot_core::session::CanvasHost;

pub fn router(host: Arc<dyn CanvasHost>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(status))
        .with_state(host)
}

async fn status(State(host): State<Arc<dyn CanvasHost>>) -> Json<serde_json::Value> {
    let label = if host.state().await.is_ready() {
        "ready"
    } else {
        "waiting"
    };
    Json(serde_json::json!({
        "status": label,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Bind and serve until the task is dropped or the process exits.
pub async fn start_server(host: Arc<dyn CanvasHost>, bind: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "liveness endpoint listening");
    axum::serve(listener, router(host)).await?;
    Ok(())
}
