//! Operations behind the HTTP surface, independent of axum.

use std::sync::Arc;

use shared::{
    error::{ApiError, ErrorCode},
    flags::UnknownFlag,
};
use storage::{StoreError, TriggerStore};
use tracing::error;
use upstream::ObsStateSource;

pub mod mappings;
pub mod sync;
pub mod transfer;

pub use mappings::{
    add_action, add_trigger, obs_state, orchestrator_payload, remove_action, remove_trigger,
    set_trigger_enabled, sync_now, sync_status,
};
pub use sync::{build_payload, SyncError, SyncHandle};
pub use transfer::{export_config, import_config, resolve_snapshot};

#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<dyn TriggerStore>,
    pub sync: SyncHandle,
    pub obs: Arc<dyn ObsStateSource>,
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound { .. } => ApiError::new(ErrorCode::NotFound, err.to_string()),
        StoreError::Conflict(_) => ApiError::new(ErrorCode::Conflict, err.to_string()),
        StoreError::Corrupt(_) | StoreError::Database(_) => {
            error!(error = %err, "store operation failed");
            ApiError::new(ErrorCode::Internal, err.to_string())
        }
    }
}

fn validation(err: UnknownFlag) -> ApiError {
    ApiError::new(ErrorCode::Validation, err.to_string())
}

fn sync_failure(err: SyncError) -> ApiError {
    ApiError::new(
        ErrorCode::SyncFailure,
        format!("saved locally, orchestrator not updated: {err}"),
    )
}

#[cfg(test)]
pub(crate) mod test_support;
