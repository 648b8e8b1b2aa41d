//! Built-in text work item, used to smoke-test a deployment end to end.

use super::WorkItemProcessor;
use crate::error::{Error, Result};
use crate::model::{WorkItemId, WorkItemPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextWorkItem {
    pub id: WorkItemId,
    pub text: String,
}

impl TextWorkItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: WorkItemId::new(),
            text: text.into(),
        }
    }
}

impl WorkItemPayload for TextWorkItem {
    const TYPE: &'static str = "TextWorkItem";

    fn id(&self) -> &WorkItemId {
        &self.id
    }
}

/// Logs the text it receives.
#[derive(Debug, Default)]
pub struct TextWorkItemProcessor;

#[async_trait]
impl WorkItemProcessor for TextWorkItemProcessor {
    type Item = TextWorkItem;

    async fn process(&self, item: TextWorkItem, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        info!(id = %item.id, text = %item.text, "processed text work item");
        Ok(())
    }
}
