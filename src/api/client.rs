//! HTTP client for the control surface, used by `flowq processor`.

use super::processor::ReplicaStates;
use crate::error::Result;
use reqwest::Method;

pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Drain the replica behind `base_url`; returns once it has stopped.
    pub async fn stop(&self) -> Result<ReplicaStates> {
        self.call(Method::PUT, "processor/stop").await
    }

    pub async fn start(&self) -> Result<ReplicaStates> {
        self.call(Method::PUT, "processor/start").await
    }

    pub async fn status(&self) -> Result<ReplicaStates> {
        self.call(Method::GET, "processor/status").await
    }

    async fn call(&self, method: Method, path: &str) -> Result<ReplicaStates> {
        let states = self
            .http
            .request(method, format!("{}/{path}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(states)
    }
}
