//! Pipeline document - the single persisted root object

use crate::diagnosis::DiagnosisSummary;
use crate::flow::FlowState;
use crate::step::StepKey;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One generated option for a step.
///
/// Everything except `id` is opaque to the flow controller and kept as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Candidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build a candidate from an arbitrary JSON value. Only objects qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.trim().is_empty() && self.fields.is_empty()
    }

    /// Best-effort display title for reports.
    pub fn title(&self) -> Option<&str> {
        ["name", "title", "headline", "label", "text"]
            .iter()
            .filter_map(|key| self.fields.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

/// Result of one step: generated candidates plus the user's selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<Candidate>,

    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StepState {
    /// A step is done iff either selection form is present.
    pub fn is_done(&self) -> bool {
        let has_id = self
            .selected_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        let has_selected = self.selected.as_ref().is_some_and(|c| !c.is_empty());
        has_id || has_selected
    }

    /// Resolve the chosen candidate: `selected` first, then `selected_id` in `candidates`.
    pub fn resolve_selected(&self) -> Option<&Candidate> {
        if let Some(selected) = self.selected.as_ref().filter(|c| !c.is_empty()) {
            return Some(selected);
        }
        let id = self.selected_id.as_deref()?.trim();
        if id.is_empty() {
            return None;
        }
        self.candidates.iter().find(|c| c.id == id)
    }
}

/// The single persisted root object of the consulting pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDocument {
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub diagnosis_summary: Option<DiagnosisSummary>,

    #[serde(default, deserialize_with = "deserialize_steps")]
    pub steps: BTreeMap<StepKey, StepState>,

    #[serde(
        default,
        deserialize_with = "deserialize_brand_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub brand_id: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub brand_flow: Option<FlowState>,

    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Unknown step names and unreadable step entries are dropped instead of
/// failing the whole document.
fn deserialize_steps<'de, D>(deserializer: D) -> Result<BTreeMap<StepKey, StepState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    let mut steps = BTreeMap::new();
    for (name, value) in raw {
        let Ok(key) = name.parse::<StepKey>() else {
            tracing::debug!(step = %name, "Dropping unknown step entry");
            continue;
        };
        match serde_json::from_value::<StepState>(value) {
            Ok(state) => {
                steps.insert(key, state);
            }
            Err(e) => {
                tracing::warn!(step = %key, error = %e, "Dropping unreadable step entry");
            }
        }
    }
    Ok(steps)
}

/// An unreadable top-level field reads as absent so the rest of the document survives.
fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(value) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match serde_json::from_value::<T>(value) {
        Ok(field) => Ok(Some(field)),
        Err(e) => {
            tracing::warn!(
                field = std::any::type_name::<T>(),
                error = %e,
                "Dropping unreadable document field"
            );
            Ok(None)
        }
    }
}

fn deserialize_brand_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        None => None,
        Some(other) => {
            tracing::warn!(value = %other, "Dropping unreadable brandId");
            None
        }
    })
}

impl PipelineDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self, key: StepKey) -> Option<&StepState> {
        self.steps.get(&key)
    }

    /// True when a non-empty diagnosis summary is present.
    pub fn has_diagnosis(&self) -> bool {
        self.diagnosis_summary
            .as_ref()
            .is_some_and(|summary| !summary.is_empty())
    }

    pub fn is_done(&self, key: StepKey) -> bool {
        self.step(key).is_some_and(StepState::is_done)
    }

    /// Locked iff any earlier step is not done.
    pub fn is_locked(&self, key: StepKey) -> bool {
        key.predecessors().iter().any(|k| !self.is_done(*k))
    }

    /// Done and not locked. A later step whose predecessor was reset does not count.
    pub fn is_complete(&self, key: StepKey) -> bool {
        self.is_done(key) && !self.is_locked(key)
    }

    /// True when every step is complete-and-valid.
    pub fn all_steps_complete(&self) -> bool {
        StepKey::ORDER.iter().all(|k| self.is_complete(*k))
    }

    /// True when a strict traversal is in progress.
    pub fn flow_active(&self) -> bool {
        self.brand_flow.as_ref().is_some_and(FlowState::is_active)
    }

    pub fn step_updated_at(&self, key: StepKey) -> Option<DateTime<Utc>> {
        self.step(key).and_then(|s| s.updated_at)
    }
}
