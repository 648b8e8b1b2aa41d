//! Replica processor state persisted in `work_item_processor_state`.

use crate::engine::status::{ReplicaStateStore, ReplicaStatus};
use crate::engine::ProcessorState;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
impl ReplicaStateStore for super::Db {
    async fn set_state(&self, replica_name: &str, state: ProcessorState) -> Result<()> {
        sqlx::query(
            "INSERT INTO work_item_processor_state (replica_name, state, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (replica_name)
             DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at",
        )
        .bind(replica_name)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replica_states(&self) -> Result<Vec<ReplicaStatus>> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT replica_name, state, updated_at
             FROM work_item_processor_state
             ORDER BY replica_name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(replica_name, state, updated_at)| {
                Ok(ReplicaStatus {
                    replica_name,
                    state: state.parse()?,
                    updated_at,
                })
            })
            .collect()
    }
}
