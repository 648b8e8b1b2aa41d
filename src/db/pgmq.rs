//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.delete. `read_ct` is pgmq's delivery counter and `vt` its
//! visibility timestamp, which is exactly the contract [`QueueClient`]
//! promises.

use crate::error::Result;
use crate::queue::{QueueClient, QueueMessage, SendReceipt, whole_seconds};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::time::Duration;

fn record_operation(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

#[async_trait]
impl QueueClient for super::Db {
    async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        record_operation(queue_name, "create");
        Ok(())
    }

    async fn send(&self, queue_name: &str, body: &str, delay: Duration) -> Result<SendReceipt> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2::jsonb, $3)")
            .bind(queue_name)
            .bind(body)
            .bind(whole_seconds(delay))
            .fetch_one(&self.pool)
            .await?;
        record_operation(queue_name, "send");
        Ok(SendReceipt {
            queue_name: queue_name.to_string(),
            msg_id: row.0,
        })
    }

    async fn receive(
        &self,
        queue_name: &str,
        invisibility: Duration,
    ) -> Result<Option<QueueMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                String,
            ),
        >(
            "SELECT msg_id, read_ct, enqueued_at, vt, message::text FROM pgmq.read($1, $2, 1)",
        )
        .bind(queue_name)
        .bind(whole_seconds(invisibility))
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, vt, body)| QueueMessage {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            body,
        });

        record_operation(
            queue_name,
            if msg.is_some() { "read" } else { "read_empty" },
        );

        Ok(msg)
    }

    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        record_operation(queue_name, "delete");
        Ok(())
    }
}
