use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(TriggerId);
id_newtype!(ActionId);

/// How a trigger's `cue_name` is compared against the live cue name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CueMatchType {
    #[default]
    None,
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Embedded,
}

impl CueMatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Exact => "Exact",
            Self::Contains => "Contains",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::Embedded => "Embedded",
        }
    }
}

impl fmt::Display for CueMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown cue match type '{0}'")]
pub struct UnknownMatchType(pub String);

impl FromStr for CueMatchType {
    type Err = UnknownMatchType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "Exact" => Ok(Self::Exact),
            "Contains" => Ok(Self::Contains),
            "StartsWith" => Ok(Self::StartsWith),
            "EndsWith" => Ok(Self::EndsWith),
            "Embedded" => Ok(Self::Embedded),
            other => Err(UnknownMatchType(other.to_string())),
        }
    }
}

/// The tuple that identifies a trigger independently of its store id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    pub cue_name: String,
    pub cue_color: u32,
    pub hotcue_type: u32,
    pub cue_match_type: CueMatchType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrigger {
    pub hotcue_type: u32,
    pub cue_color: u32,
    pub decks: u32,
    pub cue_name: String,
    pub enabled: bool,
    pub cue_match_type: CueMatchType,
}

impl NewTrigger {
    pub fn key(&self) -> TriggerKey {
        TriggerKey {
            cue_name: self.cue_name.clone(),
            cue_color: self.cue_color,
            hotcue_type: self.hotcue_type,
            cue_match_type: self.cue_match_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAction {
    pub app_id: String,
    pub action_type: String,
    pub action_args: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTriggerWithActions {
    pub trigger: NewTrigger,
    pub actions: Vec<NewAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRecord {
    pub id: TriggerId,
    pub hotcue_type: u32,
    pub cue_color: u32,
    pub decks: u32,
    pub cue_name: String,
    pub enabled: bool,
    pub cue_match_type: CueMatchType,
    pub actions: Vec<ActionRecord>,
}

impl TriggerRecord {
    pub fn key(&self) -> TriggerKey {
        TriggerKey {
            cue_name: self.cue_name.clone(),
            cue_color: self.cue_color,
            hotcue_type: self.hotcue_type,
            cue_match_type: self.cue_match_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub id: ActionId,
    pub trigger_id: TriggerId,
    pub app_id: String,
    pub action_type: String,
    pub action_args: String,
}

impl ActionRecord {
    pub fn try_args_map(&self) -> Result<BTreeMap<String, String>, MalformedArgs> {
        parse_action_args(&self.action_args)
    }

    /// Parsed arguments; malformed text degrades to an empty map.
    pub fn args_map(&self) -> BTreeMap<String, String> {
        self.try_args_map().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action arguments are not a JSON object: {reason}")]
pub struct MalformedArgs {
    pub reason: String,
}

/// Parses the stored argument text into a flat key/value map.
///
/// Scalars become their text form, `null` entries are skipped and nested
/// values are kept as compact JSON. Blank text is an empty map.
pub fn parse_action_args(raw: &str) -> Result<BTreeMap<String, String>, MalformedArgs> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let value: Value = serde_json::from_str(raw).map_err(|e| MalformedArgs {
        reason: e.to_string(),
    })?;
    let Value::Object(entries) = value else {
        return Err(MalformedArgs {
            reason: "expected an object".to_string(),
        });
    };

    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                nested => nested.to_string(),
            };
            Some((key, text))
        })
        .collect())
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
