//! Pushes of the enabled configuration to the orchestrator.
//!
//! A single worker task owns the outbound push. Callers enqueue a waiter
//! after their mutation has committed; the worker drains every queued
//! waiter, reads the store once, pushes once and answers all of them with
//! the same outcome. Pushes therefore never overlap and the last one always
//! carries the latest committed state.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::Utc;
use shared::{
    domain::{ActionRecord, TriggerRecord},
    flags::{CueColor, Deck, FlagUniverse, HotcueType},
    protocol::{SyncStatus, TriggerActionOrch, TriggerOrch},
};
use storage::TriggerStore;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use upstream::ConfigPublisher;

const SYNC_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("orchestrator push failed: {0}")]
    Publish(String),
    #[error("could not read configuration: {0}")]
    Store(String),
    #[error("sync worker is not running")]
    WorkerStopped,
}

type Waiter = oneshot::Sender<Result<usize, SyncError>>;

#[derive(Clone)]
pub struct SyncHandle {
    requests: mpsc::Sender<Waiter>,
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncHandle {
    /// Starts the worker on the current runtime. It stops once every
    /// handle is dropped.
    pub fn spawn(
        store: Arc<dyn TriggerStore>,
        publisher: Arc<dyn ConfigPublisher>,
        debounce: Duration,
    ) -> Self {
        let (requests, queue) = mpsc::channel(SYNC_QUEUE_CAPACITY);
        let status = Arc::new(RwLock::new(SyncStatus::default()));
        tokio::spawn(run_worker(
            queue,
            store,
            publisher,
            status.clone(),
            debounce,
        ));
        Self { requests, status }
    }

    /// Waits for a push that reflects every mutation committed before the
    /// call. Returns the number of triggers sent.
    pub async fn request(&self) -> Result<usize, SyncError> {
        let (waiter, outcome) = oneshot::channel();
        self.requests
            .send(waiter)
            .await
            .map_err(|_| SyncError::WorkerStopped)?;
        outcome.await.map_err(|_| SyncError::WorkerStopped)?
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }
}

async fn run_worker(
    mut queue: mpsc::Receiver<Waiter>,
    store: Arc<dyn TriggerStore>,
    publisher: Arc<dyn ConfigPublisher>,
    status: Arc<RwLock<SyncStatus>>,
    debounce: Duration,
) {
    while let Some(first) = queue.recv().await {
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }
        let mut waiters = vec![first];
        while let Ok(waiter) = queue.try_recv() {
            waiters.push(waiter);
        }

        let outcome = push_once(store.as_ref(), publisher.as_ref(), &status).await;
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "sync pass finished");
        for waiter in waiters {
            // The caller may have gone away; the push happened regardless.
            let _ = waiter.send(outcome.clone());
        }
    }
    debug!("sync worker stopped");
}

async fn push_once(
    store: &dyn TriggerStore,
    publisher: &dyn ConfigPublisher,
    status: &RwLock<SyncStatus>,
) -> Result<usize, SyncError> {
    let attempted_at = Utc::now();
    let outcome = match store.list_triggers_with_actions().await {
        Ok(triggers) => {
            let payload = build_payload(&triggers);
            publisher
                .publish(&payload)
                .await
                .map(|()| payload.len())
                .map_err(|err| SyncError::Publish(err.to_string()))
        }
        Err(err) => Err(SyncError::Store(err.to_string())),
    };

    let mut status = status.write().await;
    status.last_attempt_at = Some(attempted_at);
    match &outcome {
        Ok(count) => {
            status.pushes += 1;
            status.last_success_at = Some(Utc::now());
            status.last_error = None;
            status.last_trigger_count = *count;
            info!(triggers = count, "configuration synced to orchestrator");
        }
        Err(err) => {
            status.failures += 1;
            status.last_error = Some(err.to_string());
            warn!(error = %err, "configuration sync failed");
        }
    }
    outcome
}

/// Orchestrator view of the configuration: enabled triggers only, masks
/// expanded to `{flag: true}` maps.
pub fn build_payload(triggers: &[TriggerRecord]) -> Vec<TriggerOrch> {
    triggers
        .iter()
        .filter(|trigger| trigger.enabled)
        .map(|trigger| TriggerOrch {
            hot_cue_type: HotcueType::decode_map(trigger.hotcue_type),
            cue_match_type: trigger.cue_match_type,
            cue_color: bit_map::<CueColor>(trigger.cue_color),
            decks: bit_map::<Deck>(trigger.decks),
            cue_name: trigger.cue_name.clone(),
            actions: trigger.actions.iter().map(action_payload).collect(),
        })
        .collect()
}

fn bit_map<F: FlagUniverse>(mask: u32) -> BTreeMap<u32, bool> {
    F::decode(mask)
        .into_iter()
        .map(|flag| (flag.bit(), true))
        .collect()
}

fn action_payload(action: &ActionRecord) -> TriggerActionOrch {
    let args = action.try_args_map().unwrap_or_else(|err| {
        warn!(
            action_id = action.id.0,
            trigger_id = action.trigger_id.0,
            error = %err,
            "malformed action arguments; sending empty args"
        );
        BTreeMap::new()
    });
    TriggerActionOrch {
        app_id: action.app_id.clone(),
        action_type: action.action_type.clone(),
        args,
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
