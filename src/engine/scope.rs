//! Scope manager: the pause/resume gate in front of the consumer loop.
//!
//! At most one work item runs at a time per manager. The gate is a single
//! [`Notify`] permit: `notify_one` stores at most one wakeup, so repeated
//! signals never accumulate. State transitions happen under a mutex so a
//! `finish_and_stop` racing with a job's release is never lost.

use crate::error::{Error, Result};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Processing state of one consumer replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorState {
    /// Taking and processing new work items.
    Working,
    /// Finishing the current work item, then stopping.
    Stopping,
    /// Not processing anything.
    Stopped,
}

impl ProcessorState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorState::Working => "Working",
            ProcessorState::Stopping => "Stopping",
            ProcessorState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessorState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Working" => Ok(ProcessorState::Working),
            "Stopping" => Ok(ProcessorState::Stopping),
            "Stopped" => Ok(ProcessorState::Stopped),
            other => Err(Error::Other(format!("unknown processor state '{other}'"))),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ProcessorState,
    in_flight: bool,
}

/// Gates when the consumer may begin a work item.
#[derive(Debug)]
pub struct ScopeManager {
    replica_name: String,
    inner: Mutex<Inner>,
    gate: Notify,
    state_tx: watch::Sender<ProcessorState>,
}

impl ScopeManager {
    /// Create a manager, `Working` if `work_on_startup`, otherwise `Stopped`.
    pub fn new(replica_name: impl Into<String>, work_on_startup: bool) -> Self {
        let state = if work_on_startup {
            ProcessorState::Working
        } else {
            ProcessorState::Stopped
        };
        let gate = Notify::new();
        if work_on_startup {
            gate.notify_one();
        }
        let (state_tx, _) = watch::channel(state);
        Self {
            replica_name: replica_name.into(),
            inner: Mutex::new(Inner {
                state,
                in_flight: false,
            }),
            gate,
            state_tx,
        }
    }

    pub fn replica_name(&self) -> &str {
        &self.replica_name
    }

    pub fn state(&self) -> ProcessorState {
        self.lock().state
    }

    /// Watch state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<ProcessorState> {
        self.state_tx.subscribe()
    }

    /// Resume processing. No-op unless `Stopped`; while `Stopping` the
    /// in-flight work item must finish before processing can be resumed.
    pub fn start(&self) -> ProcessorState {
        let mut inner = self.lock();
        match inner.state {
            ProcessorState::Stopped => {
                self.transition(&mut inner, ProcessorState::Working);
                self.gate.notify_one();
            }
            ProcessorState::Stopping => {
                debug!(
                    replica = %self.replica_name,
                    "start ignored, still finishing the current work item"
                );
            }
            ProcessorState::Working => {}
        }
        inner.state
    }

    /// Let the in-flight work item finish, then stop. No-op unless `Working`.
    ///
    /// With nothing in flight the drain is already complete and the manager
    /// goes straight through `Stopping` to `Stopped`.
    pub fn finish_and_stop(&self) -> ProcessorState {
        let mut inner = self.lock();
        if inner.state == ProcessorState::Working {
            self.transition(&mut inner, ProcessorState::Stopping);
            if !inner.in_flight {
                self.transition(&mut inner, ProcessorState::Stopped);
            }
        }
        inner.state
    }

    /// Wait until the gate opens and take the single permit to run one work item.
    ///
    /// Fails with [`Error::Cancelled`] as soon as `cancel` fires, including when
    /// it was already cancelled on entry.
    pub async fn begin_scope_when_ready(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<ScopePermit> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = self.gate.notified() => {}
            }

            // A permit armed before a stop request is stale: wait again.
            let mut inner = self.lock();
            if inner.state == ProcessorState::Working && !inner.in_flight {
                inner.in_flight = true;
                return Ok(ScopePermit {
                    manager: Arc::clone(self),
                });
            }
        }
    }

    /// Poll until the manager reports `Stopped`.
    ///
    /// Fails with [`Error::Cancelled`] if `cancel` fires first, e.g. when the
    /// process shuts down while a drain is pending.
    pub async fn wait_until_stopped(
        &self,
        check_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        while self.state() != ProcessorState::Stopped {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(check_interval) => {}
            }
        }
        Ok(())
    }

    fn job_finished(&self) {
        let mut inner = self.lock();
        inner.in_flight = false;
        match inner.state {
            ProcessorState::Stopping => self.transition(&mut inner, ProcessorState::Stopped),
            ProcessorState::Working => self.gate.notify_one(),
            ProcessorState::Stopped => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: ProcessorState) {
        let from = inner.state;
        inner.state = to;
        self.state_tx.send_replace(to);
        metrics::processor_state_changes().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
        info!(replica = %self.replica_name, %from, %to, "work item processor state changed");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive permission to run one work item. Dropping it releases the
/// gate and advances the state machine.
#[derive(Debug)]
pub struct ScopePermit {
    manager: Arc<ScopeManager>,
}

impl Drop for ScopePermit {
    fn drop(&mut self) {
        self.manager.job_finished();
    }
}
