//! Superseded storage layouts
//!
//! Step pages used to cache their own results under page-local keys, and the
//! names changed several times. They are read for migration and purged on
//! reset; nothing writes them any more.

use chrono::{DateTime, Utc};
use pipeline_core::{timestamp, Candidate, StepKey, StepState};
use serde_json::Value;

/// Historical per-step keys, oldest schema first.
pub const LEGACY_STEP_KEYS: &[(StepKey, &str)] = &[
    (StepKey::Naming, "nameConsultingInterview_v1"),
    (StepKey::Naming, "namingConsultingInterview_v1"),
    (StepKey::Naming, "brandNamingInterview_v1"),
    (StepKey::Concept, "homepageConsultingInterview_v1"),
    (StepKey::Concept, "conceptConsultingInterview_v1"),
    (StepKey::Concept, "brandConceptInterview_v1"),
    (StepKey::Story, "brandStoryConsultingInterview_v1"),
    (StepKey::Story, "brandStoryInterview_v1"),
    (StepKey::Logo, "logoConsultingInterview_v1"),
    (StepKey::Logo, "logoConsultingInterview_v2"),
    (StepKey::Logo, "brandLogoInterview_v1"),
];

/// Historical locations of the diagnosis form draft.
pub const LEGACY_DIAGNOSIS_KEYS: &[&str] = &["diagnosisInterviewDraft_v1", "diagnosisDraft_v1"];

pub fn legacy_keys_for(step: StepKey) -> impl Iterator<Item = &'static str> {
    LEGACY_STEP_KEYS
        .iter()
        .filter(move |(s, _)| *s == step)
        .map(|(_, key)| *key)
}

/// Every superseded key, steps and diagnosis.
pub fn all_legacy_keys() -> impl Iterator<Item = &'static str> {
    LEGACY_STEP_KEYS
        .iter()
        .map(|(_, key)| *key)
        .chain(LEGACY_DIAGNOSIS_KEYS.iter().copied())
}

/// A step result as one of the old page caches stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyStepRecord {
    pub state: StepState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LegacyStepRecord {
    /// Normalize any of the historical shapes. Non-objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let candidates = [
            "candidates",
            "result.candidates",
            "analysis.candidates",
            "output.candidates",
        ]
        .iter()
        .find_map(|path| lookup(value, path).and_then(Value::as_array))
        .map(|items| items.iter().filter_map(Candidate::from_value).collect())
        .unwrap_or_default();

        let selected_id = ["selectedId", "selectedCandidateId", "selected_id"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(id_string);

        let selected = ["selected", "selectedCandidate"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(Candidate::from_value)
            .filter(|c| !c.is_empty());

        let updated_at = ["updatedAt", "savedAt", "updated_at"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(timestamp::parse_value);

        Some(Self {
            state: StepState {
                candidates,
                selected_id,
                selected,
                updated_at,
            },
            updated_at,
        })
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }
}

/// Extract the diagnosis form object from a legacy draft.
pub fn diagnosis_form(value: &Value) -> Option<&Value> {
    ["form", "draft", "answers"]
        .iter()
        .find_map(|key| value.get(*key).filter(|v| v.is_object()))
        .or_else(|| value.is_object().then_some(value))
}

fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_for_step() {
        let logo: Vec<_> = legacy_keys_for(StepKey::Logo).collect();
        assert_eq!(logo.len(), 3);
        assert!(logo.contains(&"logoConsultingInterview_v2"));
        assert_eq!(
            all_legacy_keys().count(),
            LEGACY_STEP_KEYS.len() + LEGACY_DIAGNOSIS_KEYS.len()
        );
    }

    #[test]
    fn test_parse_flat_record() {
        let record = LegacyStepRecord::from_value(&json!({
            "candidates": [{"id": "c1", "name": "Alpha"}, {"id": 2}],
            "selectedId": "c1",
            "updatedAt": 1_700_000_000_000i64
        }))
        .unwrap();
        assert!(record.is_done());
        assert_eq!(record.state.candidates.len(), 2);
        assert_eq!(record.state.candidates[1].id, "2");
        assert_eq!(record.updated_at.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_nested_record() {
        let record = LegacyStepRecord::from_value(&json!({
            "form": {"tone": "calm"},
            "result": {"candidates": [{"id": "s1"}]},
            "selectedCandidate": {"id": "s1", "title": "Origin"},
            "savedAt": "2024-05-01T00:00:00Z"
        }))
        .unwrap();
        assert!(record.is_done());
        assert_eq!(record.state.resolve_selected().unwrap().title(), Some("Origin"));
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_parse_unselected_record() {
        let record =
            LegacyStepRecord::from_value(&json!({"candidates": [], "selectedId": "  "})).unwrap();
        assert!(!record.is_done());
        assert!(LegacyStepRecord::from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_diagnosis_form_extraction() {
        let wrapped = json!({"form": {"companyName": "Acme"}, "step": 3});
        assert_eq!(diagnosis_form(&wrapped).unwrap()["companyName"], "Acme");

        let bare = json!({"companyName": "Acme"});
        assert_eq!(diagnosis_form(&bare).unwrap()["companyName"], "Acme");

        assert!(diagnosis_form(&json!("text")).is_none());
    }
}
