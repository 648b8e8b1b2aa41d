//! In-process queue with visibility windows and delivery counts.

use super::{QueueClient, QueueMessage, SendReceipt};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct StoredMessage {
    message: QueueMessage,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct Queues {
    next_id: i64,
    queues: HashMap<String, Vec<StoredMessage>>,
}

/// Queue held in process memory. Messages are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    inner: Mutex<Queues>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages in a queue, visible or not.
    pub fn len(&self, queue_name: &str) -> usize {
        self.lock().queues.get(queue_name).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, queue_name: &str) -> bool {
        self.len(queue_name) == 0
    }

    /// Whether a message is still held by the queue (not deleted).
    pub fn contains(&self, queue_name: &str, msg_id: i64) -> bool {
        self.lock()
            .queues
            .get(queue_name)
            .is_some_and(|q| q.iter().any(|m| m.message.msg_id == msg_id))
    }

    /// Delivery count of a message still held by the queue.
    pub fn read_count(&self, queue_name: &str, msg_id: i64) -> Option<i32> {
        self.lock().queues.get(queue_name).and_then(|q| {
            q.iter()
                .find(|m| m.message.msg_id == msg_id)
                .map(|m| m.message.read_ct)
        })
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn instant_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 60 * 60))
}

fn expiry(window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| Utc::now().checked_add_signed(w))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn missing_queue(queue_name: &str) -> Error {
    Error::Other(format!("queue '{queue_name}' does not exist"))
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn create_queue(&self, queue_name: &str) -> Result<()> {
        self.lock().queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn send(&self, queue_name: &str, body: &str, delay: Duration) -> Result<SendReceipt> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let msg_id = inner.next_id;
        let now = Utc::now();
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| missing_queue(queue_name))?;
        queue.push(StoredMessage {
            message: QueueMessage {
                msg_id,
                read_ct: 0,
                enqueued_at: now,
                vt: expiry(delay),
                body: body.to_string(),
            },
            visible_at: instant_after(delay),
        });
        Ok(SendReceipt {
            queue_name: queue_name.to_string(),
            msg_id,
        })
    }

    async fn receive(
        &self,
        queue_name: &str,
        invisibility: Duration,
    ) -> Result<Option<QueueMessage>> {
        let mut inner = self.lock();
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| missing_queue(queue_name))?;

        let now = Instant::now();
        let Some(stored) = queue.iter_mut().find(|m| m.visible_at <= now) else {
            return Ok(None);
        };

        stored.visible_at = instant_after(invisibility);
        stored.message.read_ct += 1;
        stored.message.vt = expiry(invisibility);
        Ok(Some(stored.message.clone()))
    }

    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        let mut inner = self.lock();
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| missing_queue(queue_name))?;
        queue.retain(|m| m.message.msg_id != msg_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn received_message_is_hidden_until_its_window_passes() {
        let queue = InMemoryQueue::new();
        queue.create_queue("q").await.unwrap();
        let receipt = queue.send("q", "{}", Duration::ZERO).await.unwrap();

        let first = queue
            .receive("q", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.msg_id, receipt.msg_id);
        assert_eq!(first.read_ct, 1);
        assert!(queue.receive("q", Duration::ZERO).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let second = queue.receive("q", Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(second.read_ct, 2);

        queue.delete("q", receipt.msg_id).await.unwrap();
        assert!(queue.is_empty("q"));
    }

    #[tokio::test]
    async fn delayed_message_is_not_visible_immediately() {
        let queue = InMemoryQueue::new();
        queue.create_queue("q").await.unwrap();
        queue.send("q", "{}", Duration::from_secs(60)).await.unwrap();
        assert!(queue.receive("q", Duration::ZERO).await.unwrap().is_none());
        assert_eq!(queue.len("q"), 1);
    }

    #[tokio::test]
    async fn unknown_queue_is_an_error() {
        let queue = InMemoryQueue::new();
        assert!(queue.send("nope", "{}", Duration::ZERO).await.is_err());
        assert!(queue.receive("nope", Duration::ZERO).await.is_err());
    }
}
