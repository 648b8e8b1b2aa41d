//! Work item producers.
//!
//! A producer encodes a typed payload and sends it to the work item queue,
//! optionally delayed. Enqueue failures are returned to the caller as-is;
//! there is no internal retry.

use crate::error::Result;
use crate::model::{WorkItem, WorkItemPayload};
use crate::queue::{QueueClient, SendReceipt};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hands out producers bound to one queue.
#[derive(Clone)]
pub struct WorkItemProducerFactory {
    queue: Arc<dyn QueueClient>,
    queue_name: String,
}

impl WorkItemProducerFactory {
    pub fn new(queue: Arc<dyn QueueClient>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
        }
    }

    pub fn create<T: WorkItemPayload>(&self) -> WorkItemProducer<T> {
        WorkItemProducer::new(Arc::clone(&self.queue), self.queue_name.clone())
    }
}

/// Enqueues work items of one payload type.
pub struct WorkItemProducer<T> {
    queue: Arc<dyn QueueClient>,
    queue_name: String,
    _payload: PhantomData<fn(&T)>,
}

impl<T: WorkItemPayload> WorkItemProducer<T> {
    pub fn new(queue: Arc<dyn QueueClient>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            _payload: PhantomData,
        }
    }

    /// Enqueue a work item that is visible immediately.
    pub async fn produce(&self, payload: &T) -> Result<SendReceipt> {
        self.produce_delayed(payload, Duration::ZERO).await
    }

    /// Enqueue a work item that becomes visible after `delay`.
    pub async fn produce_delayed(&self, payload: &T, delay: Duration) -> Result<SendReceipt> {
        let result = self.send(payload, delay).await;
        metrics::work_items_produced().add(
            1,
            &[
                KeyValue::new("type", T::TYPE),
                KeyValue::new("result", if result.is_ok() { "ok" } else { "error" }),
            ],
        );
        result
    }

    async fn send(&self, payload: &T, delay: Duration) -> Result<SendReceipt> {
        let body = WorkItem::encode(payload)?;
        let receipt = self.queue.send(&self.queue_name, &body, delay).await?;
        debug!(
            id = %payload.id(),
            work_item_type = T::TYPE,
            msg_id = receipt.msg_id,
            delay_ms = delay.as_millis() as u64,
            "work item enqueued"
        );
        Ok(receipt)
    }
}
