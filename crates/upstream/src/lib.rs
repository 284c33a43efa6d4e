//! Outbound HTTP clients: the orchestrator that receives the enabled
//! configuration and the OBS receiver that reports live state.

pub mod obs;
pub mod orchestrator;
pub mod retry;

pub use obs::{FetchError, ObsStateClient, ObsStateError, ObsStateSource};
pub use orchestrator::{ConfigPublisher, OrchestratorClient, PublishError};
pub use retry::{retry_fixed, RetryError, RetryPolicy};
pub use reqwest::StatusCode;
