//! Immutable discriminator → processor factory map.
//!
//! Built once at startup through [`ProcessorRegistryBuilder`] and shared
//! read-only with the consumer; there is no runtime registration.

use super::{DynWorkItemProcessor, Typed, WorkItemProcessor};
use crate::error::{Error, Result};
use crate::model::WorkItemPayload;
use std::collections::HashMap;
use std::sync::Arc;

type Factory = Arc<dyn Fn() -> Box<dyn DynWorkItemProcessor> + Send + Sync>;

/// Registry of processor factories, indexed by work item type.
pub struct ProcessorRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl ProcessorRegistry {
    pub fn builder() -> ProcessorRegistryBuilder {
        ProcessorRegistryBuilder::default()
    }

    /// Build a fresh processor for a work item type.
    pub fn resolve(&self, work_item_type: &str) -> Result<Box<dyn DynWorkItemProcessor>> {
        self.factories
            .get(work_item_type)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnregisteredWorkItem(work_item_type.to_string()))
    }

    /// Registered work item types, sorted.
    pub fn work_item_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("work_item_types", &self.work_item_types())
            .finish()
    }
}

/// Collects registrations; duplicates are reported by [`build`](Self::build).
#[derive(Default)]
pub struct ProcessorRegistryBuilder {
    factories: HashMap<&'static str, Factory>,
    duplicates: Vec<&'static str>,
}

impl ProcessorRegistryBuilder {
    /// Register a processor factory under its payload's discriminator.
    pub fn register<P, F>(mut self, factory: F) -> Self
    where
        P: WorkItemProcessor + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let work_item_type = <P::Item as WorkItemPayload>::TYPE;
        if self.factories.contains_key(work_item_type) {
            self.duplicates.push(work_item_type);
            return self;
        }
        let factory: Factory =
            Arc::new(move || Box::new(Typed(factory())) as Box<dyn DynWorkItemProcessor>);
        self.factories.insert(work_item_type, factory);
        self
    }

    pub fn build(self) -> Result<ProcessorRegistry> {
        if !self.duplicates.is_empty() {
            return Err(Error::Config(format!(
                "work item types registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(ProcessorRegistry {
            factories: self.factories,
        })
    }
}
