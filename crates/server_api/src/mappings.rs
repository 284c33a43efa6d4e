use shared::{
    domain::{ActionRecord, TriggerRecord},
    error::{ApiError, ErrorCode},
    protocol::{
        ActionTriggerRequest, MessageResponse, ObsState, SyncStatus, TriggerDescriptor,
        TriggerEnabledRequest, TriggerOrch,
    },
};
use tracing::info;

use crate::{build_payload, store_error, sync_failure, validation, ApiContext};

pub async fn add_trigger(
    ctx: &ApiContext,
    descriptor: &TriggerDescriptor,
) -> Result<TriggerRecord, ApiError> {
    let trigger = descriptor.resolve().map_err(validation)?;
    let created = ctx
        .store
        .create_trigger(trigger)
        .await
        .map_err(store_error)?;
    info!(trigger_id = created.id.0, cue_name = %created.cue_name, "trigger added");
    ctx.sync.request().await.map_err(sync_failure)?;
    Ok(created)
}

pub async fn remove_trigger(
    ctx: &ApiContext,
    descriptor: &TriggerDescriptor,
) -> Result<MessageResponse, ApiError> {
    let trigger = find(ctx, descriptor).await?;
    ctx.store
        .delete_trigger(trigger.id)
        .await
        .map_err(store_error)?;
    info!(
        trigger_id = trigger.id.0,
        actions = trigger.actions.len(),
        "trigger removed"
    );
    ctx.sync.request().await.map_err(sync_failure)?;
    Ok(MessageResponse::new("Trigger removed successfully"))
}

pub async fn set_trigger_enabled(
    ctx: &ApiContext,
    request: &TriggerEnabledRequest,
) -> Result<TriggerRecord, ApiError> {
    let trigger = find(ctx, &request.trigger).await?;
    let updated = ctx
        .store
        .set_trigger_enabled(trigger.id, request.enabled)
        .await
        .map_err(store_error)?;
    info!(trigger_id = updated.id.0, enabled = updated.enabled, "trigger toggled");
    ctx.sync.request().await.map_err(sync_failure)?;
    Ok(updated)
}

pub async fn add_action(
    ctx: &ApiContext,
    request: &ActionTriggerRequest,
) -> Result<ActionRecord, ApiError> {
    let trigger = find(ctx, &request.trigger).await?;
    let action = ctx
        .store
        .add_action(trigger.id, request.action.to_new_action())
        .await
        .map_err(store_error)?;
    info!(
        trigger_id = trigger.id.0,
        action_id = action.id.0,
        app_id = %action.app_id,
        "action added"
    );
    ctx.sync.request().await.map_err(sync_failure)?;
    Ok(action)
}

/// Removes the first action of the trigger equal to the requested one.
pub async fn remove_action(
    ctx: &ApiContext,
    request: &ActionTriggerRequest,
) -> Result<MessageResponse, ApiError> {
    let trigger = find(ctx, &request.trigger).await?;
    let action = trigger
        .actions
        .iter()
        .find(|action| request.action.matches(action))
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!(
                    "action {}/{} not found on trigger {}",
                    request.action.app_id, request.action.action_type, trigger.id.0
                ),
            )
        })?;
    ctx.store
        .remove_action(action.id)
        .await
        .map_err(store_error)?;
    info!(trigger_id = trigger.id.0, action_id = action.id.0, "action removed");
    ctx.sync.request().await.map_err(sync_failure)?;
    Ok(MessageResponse::new("Action removed successfully"))
}

pub async fn orchestrator_payload(ctx: &ApiContext) -> Result<Vec<TriggerOrch>, ApiError> {
    let triggers = ctx
        .store
        .list_triggers_with_actions()
        .await
        .map_err(store_error)?;
    Ok(build_payload(&triggers))
}

pub async fn sync_now(ctx: &ApiContext) -> Result<SyncStatus, ApiError> {
    ctx.sync.request().await.map_err(sync_failure)?;
    Ok(ctx.sync.status().await)
}

pub async fn sync_status(ctx: &ApiContext) -> SyncStatus {
    ctx.sync.status().await
}

pub async fn obs_state(ctx: &ApiContext) -> Result<ObsState, ApiError> {
    ctx.obs
        .fetch_state()
        .await
        .map_err(|err| ApiError::new(ErrorCode::UpstreamUnavailable, err.to_string()))
}

async fn find(ctx: &ApiContext, descriptor: &TriggerDescriptor) -> Result<TriggerRecord, ApiError> {
    let key = descriptor.resolve().map_err(validation)?.key();
    ctx.store.find_trigger(&key).await.map_err(store_error)
}

#[cfg(test)]
#[path = "tests/mappings_tests.rs"]
mod tests;
