//! Step Result Manager
//!
//! Records each step's generated candidates and the user's selection, and
//! invalidates later steps when an earlier one is edited.

use crate::legacy::legacy_keys_for;
use pipeline_core::{Candidate, PipelineDocument, StepKey, StepState};
use pipeline_store::PipelineStore;
use tracing::{debug, info};

/// Generated candidates plus an optional selection, as handed over by a step page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    pub candidates: Vec<Candidate>,
    pub selected_id: Option<String>,
    pub selected: Option<Candidate>,
}

impl StepResult {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }

    pub fn with_selected_id(mut self, id: impl Into<String>) -> Self {
        self.selected_id = Some(id.into());
        self
    }

    pub fn with_selected(mut self, candidate: Candidate) -> Self {
        self.selected = Some(candidate);
        self
    }
}

#[derive(Debug, Clone)]
pub struct StepResults {
    store: PipelineStore,
}

impl StepResults {
    pub fn new(store: PipelineStore) -> Self {
        Self { store }
    }

    /// Merge `result` into the step's entry with a fresh `updated_at`.
    ///
    /// Candidates are replaced. Without a new selection the stored one is kept
    /// only while it is still among the candidates. When the step's choice is
    /// lost or changed, every later step is invalidated.
    pub fn set_step_result(&self, step: StepKey, result: StepResult) -> PipelineDocument {
        let now = self.store.now();
        let mut invalidated = false;
        let doc = self.store.update(|doc| {
            let entry = doc.steps.entry(step).or_default();
            let previous = chosen_id(entry);
            entry.candidates = result.candidates;

            match (result.selected_id, result.selected) {
                (None, None) => {
                    let candidates = &entry.candidates;
                    let offered = |id: &str| candidates.iter().any(|c| c.id == id);
                    if entry.selected_id.as_deref().is_some_and(|id| !offered(id)) {
                        entry.selected_id = None;
                    }
                    if entry.selected.as_ref().is_some_and(|c| !offered(&c.id)) {
                        entry.selected = None;
                    }
                }
                (selected_id, selected) => {
                    if let Some(id) = selected_id {
                        if entry.selected.as_ref().is_some_and(|c| c.id != id) {
                            entry.selected = None;
                        }
                        entry.selected_id = Some(id);
                    }
                    if selected.is_some() {
                        entry.selected = selected;
                    }
                }
            }
            entry.updated_at = Some(now);

            let current = chosen_id(entry);
            if previous.is_some() && previous != current {
                if let Some(next) = step.next() {
                    invalidated = !Self::clear_in(doc, next).is_empty();
                }
            }
        });
        if invalidated {
            if let Some(next) = step.next() {
                self.purge_page_caches(next);
            }
            info!(step = %step, "Step choice changed, later steps cleared");
        }
        debug!(step = %step, done = doc.is_done(step), "Step result recorded");
        doc
    }

    /// The full candidate object the user picked, if it resolves.
    pub fn get_selected(&self, step: StepKey) -> Option<Candidate> {
        self.store
            .read()
            .step(step)
            .and_then(StepState::resolve_selected)
            .cloned()
    }

    /// Delete `step` and every later step, and purge their page-local caches.
    pub fn clear_steps_from(&self, step: StepKey) -> PipelineDocument {
        let mut cleared = Vec::new();
        let doc = self
            .store
            .update(|doc| cleared = Self::clear_in(doc, step));
        let purged = self.purge_page_caches(step);
        info!(from = %step, ?cleared, purged, "Cleared steps");
        doc
    }

    /// Remove `step` and every later step from `doc`, returning the steps that existed.
    pub(crate) fn clear_in(doc: &mut PipelineDocument, step: StepKey) -> Vec<StepKey> {
        step.this_and_later()
            .iter()
            .filter_map(|key| doc.steps.remove(key).map(|_| *key))
            .collect()
    }

    /// Purge the legacy keys of `step` and every later step so stale page caches
    /// cannot bring back a "done" status.
    pub(crate) fn purge_page_caches(&self, step: StepKey) -> usize {
        let keys: Vec<&str> = step
            .this_and_later()
            .iter()
            .flat_map(|s| legacy_keys_for(*s))
            .collect();
        self.store.purge_keys(keys)
    }
}

/// Id of the step's current choice, object form first.
fn chosen_id(state: &StepState) -> Option<String> {
    state
        .selected
        .as_ref()
        .filter(|c| !c.is_empty())
        .map(|c| c.id.clone())
        .or_else(|| state.selected_id.clone())
        .filter(|id| !id.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::DiagnosisSummary;
    use pipeline_store::{KeyValueStorage, MemoryStorage};
    use std::sync::Arc;

    fn setup() -> (StepResults, PipelineStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = PipelineStore::new(storage.clone());
        (StepResults::new(store.clone()), store, storage)
    }

    fn select(results: &StepResults, step: StepKey, id: &str) {
        results.set_step_result(
            step,
            StepResult::new(vec![Candidate::new(id)]).with_selected_id(id),
        );
    }

    #[test]
    fn test_set_step_result_marks_done() {
        let (results, store, _) = setup();
        let doc = results.set_step_result(
            StepKey::Naming,
            StepResult::new(vec![Candidate::new("n1"), Candidate::new("n2")]),
        );
        assert!(!doc.is_done(StepKey::Naming));
        assert!(doc.step_updated_at(StepKey::Naming).is_some());

        select(&results, StepKey::Naming, "n1");
        assert!(store.read().is_done(StepKey::Naming));
    }

    #[test]
    fn test_regeneration_keeps_selection_still_offered() {
        let (results, store, _) = setup();
        select(&results, StepKey::Concept, "c1");
        results.set_step_result(
            StepKey::Concept,
            StepResult::new(vec![Candidate::new("c1"), Candidate::new("c2")]),
        );
        assert_eq!(
            store.read().step(StepKey::Concept).unwrap().selected_id.as_deref(),
            Some("c1")
        );
    }

    #[test]
    fn test_regeneration_drops_vanished_selection_and_cascades() {
        let (results, store, storage) = setup();
        store.update(|doc| {
            doc.diagnosis_summary = Some(DiagnosisSummary {
                company_name: "Acme".to_string(),
                ..Default::default()
            })
        });
        select(&results, StepKey::Naming, "n1");
        select(&results, StepKey::Concept, "c1");
        storage.set("brandConceptInterview_v1", "{}").unwrap();

        let doc = results.set_step_result(
            StepKey::Naming,
            StepResult::new(vec![Candidate::new("n7"), Candidate::new("n8")]),
        );
        let naming = doc.step(StepKey::Naming).unwrap();
        assert!(!naming.is_done());
        assert!(naming.selected.is_none());
        assert!(results.get_selected(StepKey::Naming).is_none());
        assert!(doc.step(StepKey::Concept).is_none());
        assert!(!doc.is_complete(StepKey::Concept));
        assert!(storage.get("brandConceptInterview_v1").unwrap().is_none());
    }

    #[test]
    fn test_new_selection_replaces_stale_object() {
        let (results, store, _) = setup();
        results.set_step_result(
            StepKey::Story,
            StepResult::new(vec![Candidate::new("s1"), Candidate::new("s2")])
                .with_selected(Candidate::new("s1")),
        );
        select(&results, StepKey::Logo, "l1");

        results.set_step_result(
            StepKey::Story,
            StepResult::new(vec![Candidate::new("s1"), Candidate::new("s2")])
                .with_selected_id("s2"),
        );
        let doc = store.read();
        assert_eq!(results.get_selected(StepKey::Story).unwrap().id, "s2");
        assert!(doc.step(StepKey::Logo).is_none());
    }

    #[test]
    fn test_get_selected_resolves_object_then_id() {
        let (results, _, _) = setup();
        assert!(results.get_selected(StepKey::Story).is_none());

        results.set_step_result(
            StepKey::Story,
            StepResult::new(vec![
                Candidate::new("s1").with_field("title", "Origins"),
                Candidate::new("s2"),
            ])
            .with_selected_id("s1"),
        );
        let selected = results.get_selected(StepKey::Story).unwrap();
        assert_eq!(selected.title(), Some("Origins"));

        results.set_step_result(
            StepKey::Logo,
            StepResult::new(vec![]).with_selected(Candidate::new("l9")),
        );
        assert_eq!(results.get_selected(StepKey::Logo).unwrap().id, "l9");
    }

    #[test]
    fn test_clear_steps_from_concept() {
        let (results, store, _) = setup();
        store.update(|doc| {
            doc.diagnosis_summary = Some(DiagnosisSummary {
                company_name: "Acme".to_string(),
                ..Default::default()
            })
        });
        for step in StepKey::ORDER {
            select(&results, step, step.as_str());
        }

        let doc = results.clear_steps_from(StepKey::Concept);
        assert!(doc.is_done(StepKey::Naming));
        assert!(doc.step(StepKey::Concept).is_none());
        assert!(doc.step(StepKey::Story).is_none());
        assert!(doc.step(StepKey::Logo).is_none());
        assert!(doc.has_diagnosis());
    }

    #[test]
    fn test_clear_steps_purges_page_caches() {
        let (results, _, storage) = setup();
        storage.set("nameConsultingInterview_v1", "{}").unwrap();
        storage.set("brandStoryInterview_v1", "{}").unwrap();
        storage.set("logoConsultingInterview_v2", "{}").unwrap();

        results.clear_steps_from(StepKey::Story);

        assert!(storage.get("nameConsultingInterview_v1").unwrap().is_some());
        assert!(storage.get("brandStoryInterview_v1").unwrap().is_none());
        assert!(storage.get("logoConsultingInterview_v2").unwrap().is_none());
    }
}
