//! Durable work item queue interface.
//!
//! The queue delivers at-least-once with a visibility timeout: a received
//! message is hidden until its `vt` passes, then becomes receivable again
//! unless deleted. Every receive bumps the message's `read_ct`.
//!
//! [`crate::db::Db`] implements this over pgmq; [`InMemoryQueue`] gives the
//! same semantics inside one process for tests and local runs.

pub mod memory;

pub use memory::InMemoryQueue;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A message read from the queue. Owned by the queue until deleted.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Message identifier, also the token required to delete it.
    pub msg_id: i64,
    /// Number of times this message has been received, including this one.
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    /// When the message becomes visible to other consumers again.
    pub vt: DateTime<Utc>,
    /// Raw message body.
    pub body: String,
}

impl QueueMessage {
    /// Delivery attempt number for this receive (1-based).
    pub fn delivery_count(&self) -> u32 {
        u32::try_from(self.read_ct).unwrap_or(0)
    }
}

/// Receipt for an enqueued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub queue_name: String,
    pub msg_id: i64,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Create a queue (idempotent).
    async fn create_queue(&self, queue_name: &str) -> Result<()>;

    /// Send a message that becomes visible after `delay`.
    async fn send(&self, queue_name: &str, body: &str, delay: Duration) -> Result<SendReceipt>;

    /// Receive the next visible message, hiding it for `invisibility`.
    /// Returns None if no message is visible.
    async fn receive(
        &self,
        queue_name: &str,
        invisibility: Duration,
    ) -> Result<Option<QueueMessage>>;

    /// Delete a message permanently.
    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<()>;
}

/// Whole seconds for pgmq-style integer arguments, rounded up so a short
/// non-zero window never collapses to zero.
pub(crate) fn whole_seconds(duration: Duration) -> i32 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    i32::try_from(secs).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_seconds_rounds_up() {
        assert_eq!(whole_seconds(Duration::ZERO), 0);
        assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(30)), 30);
        assert_eq!(whole_seconds(Duration::from_millis(30_500)), 31);
        assert_eq!(whole_seconds(Duration::from_secs(u64::MAX)), i32::MAX);
    }
}
