//! Core data model.
//!
//! A work item is a tagged JSON record: an opaque `id`, a `type`
//! discriminator that selects the processor, and type-specific fields.

pub mod work_item;

pub use work_item::{WorkItem, WorkItemId, WorkItemPayload};
