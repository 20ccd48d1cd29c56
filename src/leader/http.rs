//! Read-only HTTP status endpoint of the leader.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::roster::WorkerView;
use super::Leader;
use crate::supervisor::ReconnectStatus;
use crate::{AppError, Result};

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    /// Leader name.
    pub leader: String,
    /// Workers connected to the hub right now.
    pub connected: Vec<String>,
    /// Latest status per worker.
    pub workers: Vec<WorkerView>,
    /// Workers awaiting reconnection.
    pub reconnect: ReconnectStatus,
}

/// Router with `/health` and `/status`.
pub fn router(leader: Arc<Leader>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(leader)
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(leader): State<Arc<Leader>>) -> Json<StatusBody> {
    Json(leader.status_body())
}

/// Serve the status endpoint on `127.0.0.1:port` until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the port cannot be bound.
pub async fn serve_status(leader: Arc<Leader>, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind status endpoint on {bind}: {err}")))?;

    info!(%bind, "status endpoint listening");

    axum::serve(listener, router(leader))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("status endpoint error: {err}")))?;

    info!("status endpoint shut down");
    Ok(())
}
