//! Job scope: the execution context for a single work item.
//!
//! A scope owns the scope manager permit for its consumer iteration and
//! builds a fresh processor for the work item it runs. Dropping the scope
//! releases the permit, on every path.

use super::scope::ScopePermit;
use crate::error::{Error, Result};
use crate::model::WorkItem;
use crate::processor::ProcessorRegistry;
use crate::telemetry::work::JobTelemetryScope;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct JobScope {
    registry: Arc<ProcessorRegistry>,
    _permit: ScopePermit,
}

impl JobScope {
    pub fn new(permit: ScopePermit, registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            registry,
            _permit: permit,
        }
    }

    /// Resolve the processor for the work item's type and run it.
    ///
    /// Cancellation drops the running processor and returns
    /// [`Error::Cancelled`].
    pub async fn run(&self, work_item: &WorkItem, cancel: &CancellationToken) -> Result<()> {
        let processor = self.registry.resolve(&work_item.work_item_type)?;
        debug!(id = %work_item.id, work_item_type = %work_item.work_item_type, "processor resolved");

        let mut telemetry = JobTelemetryScope::begin(&work_item.work_item_type);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = processor.process_work_item(work_item, cancel) => {
                result?;
                telemetry.set_success();
                Ok(())
            }
        }
    }
}
