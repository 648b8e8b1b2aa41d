//! Consumer loop: take a scope, read one message, dispatch, ack or retry.

use super::job::JobScope;
use super::scope::ScopeManager;
use crate::error::{Error, Result};
use crate::model::WorkItem;
use crate::processor::ProcessorRegistry;
use crate::queue::{QueueClient, QueueMessage};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_outcome, start_work_item_span};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Configuration for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Queue to consume.
    pub queue_name: String,
    /// Wait after finding the queue empty.
    pub poll_interval: Duration,
    /// How long a received message stays hidden from other consumers.
    pub invisibility_timeout: Duration,
    /// Deliveries after which a failing message is discarded.
    pub max_attempts: u32,
}

impl ConsumerOptions {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            poll_interval: Duration::from_secs(10),
            invisibility_timeout: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

enum Iteration {
    Processed,
    QueueEmpty,
}

/// The background consumer. One per process; replicas compete for messages.
pub struct WorkItemConsumer {
    queue: Arc<dyn QueueClient>,
    registry: Arc<ProcessorRegistry>,
    scope_manager: Arc<ScopeManager>,
    options: ConsumerOptions,
}

impl WorkItemConsumer {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        registry: Arc<ProcessorRegistry>,
        scope_manager: Arc<ScopeManager>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            queue,
            registry,
            scope_manager,
            options,
        }
    }

    /// Run until `cancel` fires. Failures of individual work items never
    /// end the loop.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            queue = %self.options.queue_name,
            replica = %self.scope_manager.replica_name(),
            work_item_types = ?self.registry.work_item_types(),
            "starting to process work item queue"
        );

        loop {
            let permit = match self.scope_manager.begin_scope_when_ready(&cancel).await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let scope = JobScope::new(permit, Arc::clone(&self.registry));

            match self.read_and_process(scope, &cancel).await {
                Ok(Iteration::Processed) => {}
                Ok(Iteration::QueueEmpty) => {
                    debug!(
                        queue = %self.options.queue_name,
                        sleep_ms = self.options.poll_interval.as_millis() as u64,
                        "queue is empty, sleeping"
                    );
                    if !self.pause(&cancel).await {
                        break;
                    }
                }
                Err(e) if e.is_cancellation() => break,
                Err(e) => {
                    error!(error = %e, "unexpected error during work item processing");
                    if !self.pause(&cancel).await {
                        break;
                    }
                }
            }
        }

        info!(queue = %self.options.queue_name, "work item consumer stopped");
        Ok(())
    }

    /// Sleep one poll interval. Returns false if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.options.poll_interval) => true,
        }
    }

    /// One iteration. The scope is dropped, and the permit released, when
    /// this returns.
    async fn read_and_process(
        &self,
        scope: JobScope,
        cancel: &CancellationToken,
    ) -> Result<Iteration> {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            received = self
                .queue
                .receive(&self.options.queue_name, self.options.invisibility_timeout) => received?,
        };

        let Some(message) = received else {
            return Ok(Iteration::QueueEmpty);
        };

        let work_item = match WorkItem::parse(&message.body) {
            Ok(work_item) => work_item,
            Err(e) => {
                error!(
                    msg_id = message.msg_id,
                    error = %e,
                    body = %message.body,
                    "failed to parse work item message, discarding it"
                );
                record_eviction("unknown", "malformed");
                self.delete(&message).await?;
                return Ok(Iteration::Processed);
            }
        };

        let attempt = message.delivery_count();
        let span = start_work_item_span(&work_item.work_item_type, work_item.id.as_str(), attempt);

        async {
            info!(
                attempt,
                msg_id = message.msg_id,
                "starting work item attempt"
            );

            match scope.run(&work_item, cancel).await {
                Ok(()) => {
                    record_outcome(&span, "succeeded");
                    self.delete(&message).await?;
                }
                Err(e) if e.is_cancellation() => {
                    record_outcome(&span, "cancelled");
                    warn!("work item cancelled, leaving message for redelivery");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        attempt,
                        max_attempts = self.options.max_attempts,
                        error = %e,
                        "processing work item failed"
                    );
                    if let Some(reason) = self.eviction_reason(&e, attempt) {
                        record_outcome(&span, "evicted");
                        error!(
                            reason,
                            body = %message.body,
                            "discarding work item message from the queue"
                        );
                        record_eviction(&work_item.work_item_type, reason);
                        self.delete(&message).await?;
                    } else {
                        record_outcome(&span, "retry");
                    }
                }
            }

            Ok(Iteration::Processed)
        }
        .instrument(span.clone())
        .await
    }

    /// Why a failed attempt should be discarded, or None to let the
    /// visibility timeout redeliver it.
    fn eviction_reason(&self, error: &Error, attempt: u32) -> Option<&'static str> {
        if !error.is_retriable() {
            Some("non_retriable")
        } else if attempt >= self.options.max_attempts {
            Some("max_attempts")
        } else {
            None
        }
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        self.queue
            .delete(&self.options.queue_name, message.msg_id)
            .await
    }
}

fn record_eviction(work_item_type: &str, reason: &'static str) {
    metrics::work_items_evicted().add(
        1,
        &[
            KeyValue::new("type", work_item_type.to_string()),
            KeyValue::new("reason", reason),
        ],
    );
}
