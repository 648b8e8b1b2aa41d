//! Per-replica processor status.
//!
//! Each replica records its scope manager state in a shared store so the
//! control surface and deployment tooling can see every replica at once.

use super::scope::{ProcessorState, ScopeManager};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Last recorded state of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub replica_name: String,
    pub state: ProcessorState,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ReplicaStateStore: Send + Sync {
    async fn set_state(&self, replica_name: &str, state: ProcessorState) -> Result<()>;

    /// All known replicas, ordered by name.
    async fn replica_states(&self) -> Result<Vec<ReplicaStatus>>;
}

/// State store held in process memory; sees only this process's replica.
#[derive(Debug, Default)]
pub struct InMemoryReplicaStateStore {
    states: Mutex<BTreeMap<String, ReplicaStatus>>,
}

impl InMemoryReplicaStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ReplicaStatus>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReplicaStateStore for InMemoryReplicaStateStore {
    async fn set_state(&self, replica_name: &str, state: ProcessorState) -> Result<()> {
        self.lock().insert(
            replica_name.to_string(),
            ReplicaStatus {
                replica_name: replica_name.to_string(),
                state,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn replica_states(&self) -> Result<Vec<ReplicaStatus>> {
        Ok(self.lock().values().cloned().collect())
    }
}

/// Spawn a task that writes every state change of `manager` to `store`,
/// starting with the current state, until `cancel` fires.
pub fn spawn_state_recorder(
    manager: &ScopeManager,
    store: Arc<dyn ReplicaStateStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let replica_name = manager.replica_name().to_string();
    let mut rx = manager.subscribe();

    tokio::spawn(async move {
        loop {
            let state = *rx.borrow_and_update();
            match store.set_state(&replica_name, state).await {
                Ok(()) => debug!(replica = %replica_name, %state, "recorded processor state"),
                Err(e) => warn!(replica = %replica_name, %state, error = %e, "failed to record processor state"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
