use shared::{
    domain::NewTriggerWithActions,
    error::ApiError,
    protocol::{ActionDescriptor, ConfigState},
};
use tracing::info;

use crate::{store_error, sync_failure, validation, ApiContext};

pub async fn export_config(ctx: &ApiContext) -> Result<ConfigState, ApiError> {
    let triggers = ctx
        .store
        .list_triggers_with_actions()
        .await
        .map_err(store_error)?;
    Ok(ConfigState::from_records(&triggers))
}

/// Replaces the whole configuration with `state` and pushes it.
///
/// Nothing is written unless every entry resolves; a failed push leaves the
/// imported configuration in place.
pub async fn import_config(ctx: &ApiContext, state: ConfigState) -> Result<usize, ApiError> {
    let snapshot = resolve_snapshot(&state)?;
    let imported = ctx.store.replace_all(snapshot).await.map_err(store_error)?;
    info!(triggers = imported, "configuration imported");
    ctx.sync.request().await.map_err(sync_failure)?;
    Ok(imported)
}

pub fn resolve_snapshot(state: &ConfigState) -> Result<Vec<NewTriggerWithActions>, ApiError> {
    state
        .config
        .iter()
        .map(|entry| {
            Ok(NewTriggerWithActions {
                trigger: entry.trigger.resolve().map_err(validation)?,
                actions: entry
                    .actions
                    .iter()
                    .map(ActionDescriptor::to_new_action)
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/transfer_tests.rs"]
mod tests;
