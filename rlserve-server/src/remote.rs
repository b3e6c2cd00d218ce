// Remote policy actor reached over HTTP

use async_trait::async_trait;
use rlserve_core::{Action, PolicyHandle, Result, ServeError};
use serde_json::json;
use std::time::Duration;

/// Posts `{"obs": [...]}` to the actor endpoint and decodes an [`Action`]
#[derive(Debug, Clone)]
pub struct RemotePolicyHandle {
    client: reqwest::Client,
    url: String,
}

impl RemotePolicyHandle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServeError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PolicyHandle for RemotePolicyHandle {
    async fn compute(&self, observation: Vec<f64>) -> Result<Action> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "obs": observation }))
            .send()
            .await
            .map_err(|e| ServeError::Upstream(format!("policy actor unreachable: {e}")))?;

        let response = response
            .error_for_status()
            .map_err(|e| ServeError::Upstream(format!("policy actor failed: {e}")))?;

        response
            .json::<Action>()
            .await
            .map_err(|e| ServeError::Upstream(format!("invalid policy actor response: {e}")))
    }
}
