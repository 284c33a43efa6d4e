use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::CueMatchType,
    flags::{CueColor, Deck, FlagUniverse, HotcueType},
    protocol::{ActionDescriptor, ActionTriggerRequest, ObsState, TriggerDescriptor, TriggerOrch},
};
use storage::Storage;
use tokio::sync::Mutex;
use upstream::{
    ConfigPublisher, FetchError, ObsStateError, ObsStateSource, PublishError, StatusCode,
};

use crate::{ApiContext, SyncHandle};

#[derive(Default)]
pub(crate) struct RecordingPublisher {
    pub pushes: Mutex<Vec<Vec<TriggerOrch>>>,
    pub fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn push_count(&self) -> usize {
        self.pushes.lock().await.len()
    }

    pub async fn last_push(&self) -> Vec<TriggerOrch> {
        self.pushes.lock().await.last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ConfigPublisher for RecordingPublisher {
    async fn publish(&self, triggers: &[TriggerOrch]) -> Result<(), PublishError> {
        self.pushes.lock().await.push(triggers.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Status(StatusCode::BAD_GATEWAY));
        }
        Ok(())
    }
}

pub(crate) struct StaticObs(pub Option<Value>);

#[async_trait]
impl ObsStateSource for StaticObs {
    async fn fetch_state(&self) -> Result<ObsState, ObsStateError> {
        match &self.0 {
            Some(state) => Ok(ObsState(state.clone())),
            None => Err(ObsStateError::Unavailable {
                attempts: 3,
                source: FetchError::Status(StatusCode::SERVICE_UNAVAILABLE),
            }),
        }
    }
}

pub(crate) async fn context_with(
    publisher: Arc<RecordingPublisher>,
    obs: StaticObs,
    debounce: Duration,
) -> ApiContext {
    let store = Arc::new(Storage::new("sqlite::memory:").await.expect("db"));
    ApiContext {
        store: store.clone(),
        sync: SyncHandle::spawn(store, publisher, debounce),
        obs: Arc::new(obs),
    }
}

pub(crate) async fn context(publisher: Arc<RecordingPublisher>) -> ApiContext {
    context_with(publisher, StaticObs(None), Duration::ZERO).await
}

/// Trigger "A": Red|Blue hot cue on decks 1 and 2, exact name match.
pub(crate) fn trigger_a() -> TriggerDescriptor {
    TriggerDescriptor {
        hotcue_type: HotcueType::HotCue.bit().into(),
        cue_color: CueColor::encode([CueColor::Red, CueColor::Blue]).into(),
        decks: Deck::encode([Deck::Deck1, Deck::Deck2]).into(),
        cue_name: "A".to_string(),
        enabled: true,
        cue_match_type: CueMatchType::Exact,
    }
}

pub(crate) fn scene_action() -> ActionDescriptor {
    ActionDescriptor {
        app_id: "obs".to_string(),
        action_type: "scene".to_string(),
        action_args: "{}".to_string(),
    }
}

pub(crate) fn attach(trigger: TriggerDescriptor, action: ActionDescriptor) -> ActionTriggerRequest {
    ActionTriggerRequest { trigger, action }
}
