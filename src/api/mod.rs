//! HTTP control surface for operators and deployment tooling.
//!
//! `PUT /processor/stop` drains this replica and blocks until it is
//! stopped; `PUT /processor/start` resumes it. Both are idempotent.

pub mod client;
pub mod error;
pub mod health;
pub mod processor;

pub use client::ControlClient;
pub use error::ApiError;

use crate::engine::{ReplicaStateStore, ScopeManager};
use crate::error::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state for the control routes.
#[derive(Clone)]
pub struct AppState {
    pub scope_manager: Arc<ScopeManager>,
    pub state_store: Arc<dyn ReplicaStateStore>,
    /// How often `stop` re-checks whether the drain has finished.
    pub stop_check_interval: Duration,
    /// Process shutdown; ends pending `stop` waits.
    pub shutdown: CancellationToken,
}

/// Build the control router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/processor", processor::router())
        .merge(health::router())
        .with_state(state)
}

/// Serve the control router on `listener` until `cancel` fires.
pub async fn serve(listener: TcpListener, state: AppState, cancel: CancellationToken) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "control surface listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}
