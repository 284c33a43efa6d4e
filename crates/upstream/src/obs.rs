use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::protocol::ObsState;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::retry::{retry_fixed, RetryError, RetryPolicy};

pub const OBS_STATE_MAX_ATTEMPTS: usize = 3;
pub const OBS_STATE_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to OBS receiver failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OBS receiver answered with status {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error)]
pub enum ObsStateError {
    #[error("OBS state unavailable after {attempts} attempts: {source}")]
    Unavailable {
        attempts: usize,
        #[source]
        source: FetchError,
    },
    #[error("OBS state request cancelled")]
    Cancelled,
}

#[async_trait]
pub trait ObsStateSource: Send + Sync {
    async fn fetch_state(&self) -> Result<ObsState, ObsStateError>;
}

/// Read-only client for the OBS receiver's state endpoint.
#[derive(Debug, Clone)]
pub struct ObsStateClient {
    http: Client,
    url: Url,
    policy: RetryPolicy,
}

impl ObsStateClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            url,
            policy: RetryPolicy::new(OBS_STATE_MAX_ATTEMPTS, OBS_STATE_RETRY_DELAY),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.policy.delay = delay;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Like [`ObsStateSource::fetch_state`], but gives up as soon as
    /// `cancel` resolves.
    pub async fn fetch_state_until<C>(&self, cancel: C) -> Result<ObsState, ObsStateError>
    where
        C: Future<Output = ()> + Send,
    {
        let result = retry_fixed(self.policy, cancel, |attempt| async move {
            debug!(url = %self.url, attempt, "requesting OBS state");
            self.fetch_once().await
        })
        .await;

        result.map_err(|err| match err {
            RetryError::Exhausted { attempts, last } => {
                error!(url = %self.url, attempts, error = %last, "OBS state unavailable");
                ObsStateError::Unavailable {
                    attempts,
                    source: last,
                }
            }
            RetryError::Cancelled => ObsStateError::Cancelled,
        })
    }

    async fn fetch_once(&self) -> Result<ObsState, FetchError> {
        let response = self.http.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.json::<ObsState>().await?)
    }
}

#[async_trait]
impl ObsStateSource for ObsStateClient {
    async fn fetch_state(&self) -> Result<ObsState, ObsStateError> {
        self.fetch_state_until(std::future::pending()).await
    }
}

#[cfg(test)]
#[path = "tests/obs_tests.rs"]
mod tests;
