//! Work item processor start/stop/status routes.
//!
//! Responses map replica names to processor states, e.g.
//! `{"localReplica": "Stopped"}`.

use super::{ApiError, AppState};
use crate::engine::ProcessorState;
use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub type ReplicaStates = BTreeMap<String, ProcessorState>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stop", put(stop))
        .route("/start", put(start))
        .route("/status", get(status))
}

/// Request a drain and wait until the in-flight work item has finished.
async fn stop(State(state): State<AppState>) -> Result<Json<ReplicaStates>, ApiError> {
    let manager = &state.scope_manager;
    info!(replica = %manager.replica_name(), "stopping work item processor");
    if manager.finish_and_stop() != ProcessorState::Stopped {
        info!(
            replica = %manager.replica_name(),
            "waiting for work item processor to finish its current work item"
        );
    }

    if manager
        .wait_until_stopped(state.stop_check_interval, &state.shutdown)
        .await
        .is_err()
    {
        warn!(
            replica = %manager.replica_name(),
            state = %manager.state(),
            "shutting down before the work item processor stopped"
        );
        return Err(ApiError::Unavailable(format!(
            "shutting down while {} was {}",
            manager.replica_name(),
            manager.state()
        )));
    }

    Ok(Json(local_state(&state)))
}

async fn start(State(state): State<AppState>) -> Json<ReplicaStates> {
    info!(replica = %state.scope_manager.replica_name(), "starting work item processor");
    state.scope_manager.start();
    Json(local_state(&state))
}

/// States of every replica known to the store. This replica's entry is
/// always its live state.
async fn status(State(state): State<AppState>) -> Result<Json<ReplicaStates>, ApiError> {
    let mut states: ReplicaStates = state
        .state_store
        .replica_states()
        .await?
        .into_iter()
        .map(|status| (status.replica_name, status.state))
        .collect();
    states.extend(local_state(&state));
    Ok(Json(states))
}

fn local_state(state: &AppState) -> ReplicaStates {
    BTreeMap::from([(
        state.scope_manager.replica_name().to_string(),
        state.scope_manager.state(),
    )])
}
