use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::protocol::TriggerOrch;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("orchestrator request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("orchestrator rejected configuration with status {0}")]
    Status(StatusCode),
}

/// Destination for full configuration snapshots.
#[async_trait]
pub trait ConfigPublisher: Send + Sync {
    async fn publish(&self, triggers: &[TriggerOrch]) -> Result<(), PublishError>;
}

#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    http: Client,
    url: Url,
}

impl OrchestratorClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConfigPublisher for OrchestratorClient {
    async fn publish(&self, triggers: &[TriggerOrch]) -> Result<(), PublishError> {
        debug!(url = %self.url, count = triggers.len(), "pushing configuration");
        let response = self
            .http
            .post(self.url.clone())
            .json(triggers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status(status));
        }
        info!(url = %self.url, count = triggers.len(), "orchestrator accepted configuration");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
