//! Work item engine: scope gating, the consumer loop, job scopes, and
//! per-replica status.

pub mod consumer;
pub mod job;
pub mod scope;
pub mod status;

pub use consumer::{ConsumerOptions, WorkItemConsumer};
pub use job::JobScope;
pub use scope::{ProcessorState, ScopeManager, ScopePermit};
pub use status::{InMemoryReplicaStateStore, ReplicaStateStore, ReplicaStatus, spawn_state_recorder};
