use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    domain::{ActionRecord, CueMatchType, NewAction, NewTrigger, TriggerRecord},
    flags::{CueColor, Deck, HotcueType, MaskInput, UnknownFlag},
};

/// Trigger as exchanged in bulk export/import and incremental requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDescriptor {
    #[serde(default)]
    pub hotcue_type: MaskInput,
    #[serde(default)]
    pub cue_color: MaskInput,
    #[serde(default)]
    pub decks: MaskInput,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cue_name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cue_match_type: CueMatchType,
}

impl TriggerDescriptor {
    pub fn resolve(&self) -> Result<NewTrigger, UnknownFlag> {
        Ok(NewTrigger {
            hotcue_type: self.hotcue_type.resolve::<HotcueType>()?,
            cue_color: self.cue_color.resolve::<CueColor>()?,
            decks: self.decks.resolve::<Deck>()?,
            cue_name: self.cue_name.clone(),
            enabled: self.enabled,
            cue_match_type: self.cue_match_type,
        })
    }
}

impl From<&TriggerRecord> for TriggerDescriptor {
    fn from(record: &TriggerRecord) -> Self {
        Self {
            hotcue_type: record.hotcue_type.into(),
            cue_color: record.cue_color.into(),
            decks: record.decks.into(),
            cue_name: record.cue_name.clone(),
            enabled: record.enabled,
            cue_match_type: record.cue_match_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    pub app_id: String,
    pub action_type: String,
    /// Argument object as text. An inline JSON object is accepted and
    /// stored in its compact text form.
    #[serde(default, deserialize_with = "args_text")]
    pub action_args: String,
}

impl ActionDescriptor {
    pub fn to_new_action(&self) -> NewAction {
        NewAction {
            app_id: self.app_id.clone(),
            action_type: self.action_type.clone(),
            action_args: self.action_args.clone(),
        }
    }

    pub fn matches(&self, record: &ActionRecord) -> bool {
        self.app_id == record.app_id
            && self.action_type == record.action_type
            && self.action_args == record.action_args
    }
}

impl From<&ActionRecord> for ActionDescriptor {
    fn from(record: &ActionRecord) -> Self {
        Self {
            app_id: record.app_id.clone(),
            action_type: record.action_type.clone(),
            action_args: record.action_args.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub trigger: TriggerDescriptor,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
}

/// Whole mapping configuration, in trigger insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigState {
    #[serde(default)]
    pub config: Vec<ConfigEntry>,
}

impl ConfigState {
    pub fn from_records(triggers: &[TriggerRecord]) -> Self {
        Self {
            config: triggers
                .iter()
                .map(|trigger| ConfigEntry {
                    trigger: TriggerDescriptor::from(trigger),
                    actions: trigger.actions.iter().map(ActionDescriptor::from).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTriggerRequest {
    pub trigger: TriggerDescriptor,
    pub action: ActionDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEnabledRequest {
    pub trigger: TriggerDescriptor,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One enabled trigger in the shape the orchestrator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOrch {
    pub hot_cue_type: BTreeMap<HotcueType, bool>,
    pub cue_match_type: CueMatchType,
    pub cue_color: BTreeMap<u32, bool>,
    pub decks: BTreeMap<u32, bool>,
    pub cue_name: String,
    pub actions: Vec<TriggerActionOrch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerActionOrch {
    pub app_id: String,
    pub action_type: String,
    pub args: BTreeMap<String, String>,
}

/// State reported by the OBS receiver, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObsState(pub Value);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub pushes: u64,
    pub failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub last_trigger_count: usize,
}

fn enabled_by_default() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn args_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
