//! Work item processors and the registry that routes to them.
//!
//! A processor handles exactly one payload type. The registry maps each
//! payload's discriminator to a factory, so every work item gets a fresh
//! processor instance that lives only as long as its job scope.

pub mod registry;
pub mod text;

pub use registry::{ProcessorRegistry, ProcessorRegistryBuilder};
pub use text::{TextWorkItem, TextWorkItemProcessor};

use crate::error::Result;
use crate::model::{WorkItem, WorkItemPayload};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Handles one typed work item payload.
///
/// Return [`crate::error::Error::NonRetriable`] for failures that redelivery
/// cannot fix; any other error leaves the message on the queue for another
/// attempt. Processors must tolerate duplicate and out-of-order delivery.
#[async_trait]
pub trait WorkItemProcessor: Send + Sync {
    type Item: WorkItemPayload;

    async fn process(&self, item: Self::Item, cancel: &CancellationToken) -> Result<()>;
}

/// Type-erased processor, as resolved from the registry.
#[async_trait]
pub trait DynWorkItemProcessor: Send + Sync {
    async fn process_work_item(&self, item: &WorkItem, cancel: &CancellationToken) -> Result<()>;
}

struct Typed<P>(P);

#[async_trait]
impl<P> DynWorkItemProcessor for Typed<P>
where
    P: WorkItemProcessor,
{
    async fn process_work_item(&self, item: &WorkItem, cancel: &CancellationToken) -> Result<()> {
        let payload = item.decode::<P::Item>()?;
        self.0.process(payload, cancel).await
    }
}
