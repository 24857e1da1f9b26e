//! Flow Controller
//!
//! Owns the strict traversal lifecycle on top of the pipeline document. Every
//! transition is one read-modify-write of the whole document.

use crate::config::BrandFlowConfig;
use crate::diagnosis::build_diagnosis_summary_from_draft;
use crate::error::{FlowError, Result};
use crate::guard::{AccessDecision, StepGuard};
use crate::legacy::all_legacy_keys;
use crate::migration::{migrate_legacy_to_pipeline_if_needed, MigrationReport};
use crate::notice::{FlowNotice, NoticeBus, NoticeKind};
use crate::steps::{StepResult, StepResults};
use pipeline_core::{
    Candidate, Clock, DiagnosisSummary, FlowState, PendingAbort, PipelineDocument, StepKey,
};
use pipeline_store::{KeyValueStorage, PipelinePatch, PipelineStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FlowController {
    store: PipelineStore,
    results: StepResults,
    guard: StepGuard,
    notices: NoticeBus,
    config: BrandFlowConfig,
}

impl FlowController {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: BrandFlowConfig) -> Self {
        let store = PipelineStore::new(storage).with_key(config.storage_key.clone());
        Self::from_store(store, config)
    }

    /// Same as `new`, with an explicit time source.
    pub fn with_clock(
        storage: Arc<dyn KeyValueStorage>,
        config: BrandFlowConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = PipelineStore::new(storage)
            .with_key(config.storage_key.clone())
            .with_clock(clock);
        Self::from_store(store, config)
    }

    fn from_store(store: PipelineStore, config: BrandFlowConfig) -> Self {
        Self {
            results: StepResults::new(store.clone()),
            guard: StepGuard::new(config.diagnosis_route.clone()),
            notices: NoticeBus::default(),
            store,
            config,
        }
    }

    pub fn store(&self) -> &PipelineStore {
        &self.store
    }

    pub fn results(&self) -> &StepResults {
        &self.results
    }

    pub fn notices(&self) -> &NoticeBus {
        &self.notices
    }

    pub fn config(&self) -> &BrandFlowConfig {
        &self.config
    }

    pub fn read(&self) -> PipelineDocument {
        self.store.read()
    }

    pub fn migrate(&self) -> MigrationReport {
        migrate_legacy_to_pipeline_if_needed(&self.store)
    }

    // ========== Lifecycle ==========

    /// Clear all four steps and install a fresh active flow on `naming`.
    pub fn start_brand_flow(&self, brand_id: Option<&str>) -> PipelineDocument {
        let now = self.store.now();
        let doc = self.store.update(|doc| {
            StepResults::clear_in(doc, StepKey::Naming);
            if let Some(brand_id) = brand_id {
                doc.brand_id = Some(brand_id.to_string());
            }
            doc.brand_flow = Some(FlowState::start(now));
        });
        self.results.purge_page_caches(StepKey::Naming);
        info!(brand_id = ?doc.brand_id, "Brand flow started");
        doc
    }

    /// Move the current-step marker. Creates an active flow when there is none.
    pub fn set_brand_flow_current(&self, step: StepKey) -> PipelineDocument {
        let now = self.store.now();
        let doc = self.store.update(|doc| {
            doc.brand_flow = Some(FlowState::advance(doc.brand_flow.as_ref(), step, now));
        });
        debug!(
            requested = %step,
            current = ?doc.brand_flow.as_ref().map(FlowState::current_step),
            "Brand flow current step set"
        );
        doc
    }

    /// Give up mid-flow: clear every step and deactivate. Idempotent.
    pub fn abort_brand_flow(&self, reason: &str) -> PipelineDocument {
        let now = self.store.now();
        let doc = self.store.update(|doc| {
            StepResults::clear_in(doc, StepKey::Naming);
            doc.brand_flow = Some(FlowState::abort(doc.brand_flow.as_ref(), reason, now));
        });
        self.results.purge_page_caches(StepKey::Naming);
        info!(reason = %reason, "Brand flow aborted");
        doc
    }

    /// Deactivate after the last step without touching step data.
    pub fn complete_brand_flow(&self) -> PipelineDocument {
        let now = self.store.now();
        let doc = self.store.update(|doc| {
            doc.brand_flow = Some(FlowState::complete(doc.brand_flow.as_ref(), now));
        });
        info!("Brand flow completed");
        doc
    }

    /// Flag a suspected interruption for the next load. No-op without an active flow.
    pub fn mark_brand_flow_pending_abort(&self, reason: &str) -> bool {
        let mut doc = self.store.read();
        let Some(flagged) = doc
            .brand_flow
            .as_ref()
            .and_then(|flow| flow.with_pending_abort(reason))
        else {
            debug!(reason = %reason, "No active flow, pending abort ignored");
            return false;
        };
        doc.brand_flow = Some(flagged);
        self.store.write(doc);
        debug!(reason = %reason, "Brand flow marked pending abort");
        true
    }

    /// Read and clear the pending-abort flag. Writes only when it was set.
    pub fn consume_brand_flow_pending_abort(&self) -> Option<PendingAbort> {
        let mut doc = self.store.read();
        let (cleared, pending) = doc.brand_flow.as_ref()?.take_pending_abort();
        let pending = pending?;
        doc.brand_flow = Some(cleared);
        self.store.write(doc);
        Some(pending)
    }

    /// Reset an interrupted session and announce it once.
    pub fn recover_interrupted(&self) -> Option<FlowNotice> {
        let pending = self.consume_brand_flow_pending_abort()?;
        info!(reason = %pending.reason, "Recovering interrupted brand flow");
        self.abort_brand_flow(&pending.reason);

        let notice = FlowNotice::new(
            NoticeKind::Interrupted,
            self.config.interrupted_notice_message.clone(),
        );
        self.notices.publish(notice.clone());
        Some(notice)
    }

    // ========== Guards ==========

    pub fn ensure_step_access(&self, step: StepKey) -> AccessDecision {
        let decision = self.guard.ensure_step_access(&self.store.read(), step);
        self.announce_denial(step, &decision);
        decision
    }

    pub fn ensure_strict_step_access(&self, step: StepKey) -> AccessDecision {
        let decision = self.guard.ensure_strict_step_access(&self.store.read(), step);
        self.announce_denial(step, &decision);
        decision
    }

    /// What a step page does on mount: migrate, strict-check, then move the marker.
    pub fn enter_step(&self, step: StepKey) -> AccessDecision {
        self.migrate();
        let decision = self.ensure_strict_step_access(step);
        if decision.ok() {
            self.set_brand_flow_current(step);
        }
        decision
    }

    fn announce_denial(&self, step: StepKey, decision: &AccessDecision) {
        if let Some(reason) = decision.reason() {
            debug!(step = %step, reason = %reason, redirect_to = ?decision.redirect_to(), "Step access denied");
            self.notices
                .publish(FlowNotice::new(NoticeKind::AccessDenied, reason.message()));
        }
    }

    // ========== Step data ==========

    pub fn set_step_result(&self, step: StepKey, result: StepResult) -> PipelineDocument {
        self.results.set_step_result(step, result)
    }

    pub fn get_selected(&self, step: StepKey) -> Option<Candidate> {
        self.results.get_selected(step)
    }

    pub fn clear_steps_from(&self, step: StepKey) -> PipelineDocument {
        self.results.clear_steps_from(step)
    }

    /// Select `candidate_id` among the step's candidates.
    ///
    /// Changing an existing selection invalidates every later step. Confirming
    /// the logo completes the flow.
    pub fn confirm_selection(&self, step: StepKey, candidate_id: &str) -> Result<PipelineDocument> {
        let current = self.store.read();
        if let Some(reason) = self
            .guard
            .ensure_strict_step_access(&current, step)
            .reason()
        {
            return Err(FlowError::StepLocked { step, reason });
        }

        let state = current.step(step);
        let candidate = state
            .and_then(|s| s.candidates.iter().find(|c| c.id == candidate_id))
            .cloned()
            .ok_or_else(|| FlowError::UnknownCandidate {
                step,
                candidate_id: candidate_id.to_string(),
            })?;
        let changed = state
            .and_then(|s| s.resolve_selected())
            .map(|c| c.id.as_str())
            != Some(candidate_id);
        let invalidate_from = step.next().filter(|_| changed);

        let now = self.store.now();
        let mut doc = self.store.update(|doc| {
            if let Some(next) = invalidate_from {
                StepResults::clear_in(doc, next);
            }
            let entry = doc.steps.entry(step).or_default();
            entry.selected_id = Some(candidate.id.clone());
            entry.selected = Some(candidate);
            entry.updated_at = Some(now);
        });
        if let Some(next) = invalidate_from {
            self.results.purge_page_caches(next);
        }
        info!(step = %step, candidate_id = %candidate_id, changed, "Selection confirmed");

        if step == StepKey::Logo && doc.flow_active() {
            doc = self.complete_brand_flow();
        }
        Ok(doc)
    }

    /// Build the summary from a raw diagnosis form and replace the stored one.
    pub fn submit_diagnosis(&self, raw_form: &Value) -> DiagnosisSummary {
        let summary = build_diagnosis_summary_from_draft(raw_form);
        self.store
            .merge(PipelinePatch::new().diagnosis_summary(summary.clone()));
        info!(short_text = %summary.short_text, "Diagnosis summary submitted");
        summary
    }

    /// Drop the whole document and every superseded key.
    pub fn reset_all(&self) {
        self.store.clear();
        let purged = self.store.purge_keys(all_legacy_keys());
        info!(purged, "Pipeline reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::AccessReason;
    use chrono::Duration;
    use pipeline_core::ManualClock;
    use pipeline_store::MemoryStorage;
    use serde_json::json;

    fn setup() -> (FlowController, Arc<MemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::default());
        let controller =
            FlowController::with_clock(storage.clone(), BrandFlowConfig::default(), clock.clone());
        (controller, storage, clock)
    }

    fn with_diagnosis(controller: &FlowController) {
        controller.submit_diagnosis(&json!({"companyName": "Acme", "industry": "Retail"}));
    }

    fn offer(controller: &FlowController, step: StepKey, ids: &[&str]) {
        let candidates = ids.iter().map(|id| Candidate::new(*id)).collect();
        controller.set_step_result(step, StepResult::new(candidates));
    }

    #[test]
    fn test_start_clears_steps_and_keeps_diagnosis() {
        let (controller, _, _) = setup();
        with_diagnosis(&controller);
        offer(&controller, StepKey::Naming, &["n1"]);
        controller.confirm_selection(StepKey::Naming, "n1").unwrap();

        let doc = controller.start_brand_flow(Some("brand-7"));
        assert!(doc.steps.is_empty());
        assert!(doc.has_diagnosis());
        assert_eq!(doc.brand_id.as_deref(), Some("brand-7"));
        assert!(doc.flow_active());
        assert_eq!(doc.brand_flow.unwrap().current_step(), StepKey::Naming);
    }

    #[test]
    fn test_set_current_auto_creates_flow() {
        let (controller, _, _) = setup();
        let doc = controller.set_brand_flow_current(StepKey::Story);
        let flow = doc.brand_flow.unwrap();
        assert!(flow.is_active());
        assert_eq!(flow.current_step(), StepKey::Story);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let (controller, _, _) = setup();
        controller.start_brand_flow(None);
        let first = controller.abort_brand_flow("user_cancel");
        let second = controller.abort_brand_flow("user_cancel");
        for doc in [first, second] {
            let flow = doc.brand_flow.unwrap();
            assert!(!flow.is_active());
            assert_eq!(flow.current_step(), StepKey::Naming);
            assert!(doc.steps.is_empty());
        }
    }

    #[test]
    fn test_pending_abort_consumed_once() {
        let (controller, _, _) = setup();
        assert!(!controller.mark_brand_flow_pending_abort("unload"));

        controller.start_brand_flow(None);
        assert!(controller.mark_brand_flow_pending_abort("unload"));

        let pending = controller.consume_brand_flow_pending_abort().unwrap();
        assert_eq!(pending.reason, "unload");
        assert!(controller.consume_brand_flow_pending_abort().is_none());
        assert!(controller.read().flow_active());
    }

    #[test]
    fn test_set_current_clears_pending_abort() {
        let (controller, _, _) = setup();
        controller.start_brand_flow(None);
        assert!(controller.mark_brand_flow_pending_abort("unload"));

        let doc = controller.set_brand_flow_current(StepKey::Concept);
        assert_eq!(doc.brand_flow.unwrap().current_step(), StepKey::Concept);
        assert!(controller.consume_brand_flow_pending_abort().is_none());
        assert!(controller.recover_interrupted().is_none());
        assert!(controller.read().flow_active());
    }

    #[test]
    fn test_recover_interrupted_aborts_and_notifies() {
        let (controller, _, _) = setup();
        let mut notices = controller.notices().subscribe();
        with_diagnosis(&controller);
        controller.start_brand_flow(None);
        offer(&controller, StepKey::Naming, &["n1"]);
        controller.confirm_selection(StepKey::Naming, "n1").unwrap();
        controller.mark_brand_flow_pending_abort("reload");

        let notice = controller.recover_interrupted().unwrap();
        assert_eq!(notice.kind, NoticeKind::Interrupted);
        assert_eq!(notices.try_recv().unwrap(), notice);

        let doc = controller.read();
        assert!(!doc.flow_active());
        assert!(doc.steps.is_empty());
        assert!(controller.recover_interrupted().is_none());
    }

    #[test]
    fn test_guard_denial_publishes_notice() {
        let (controller, _, _) = setup();
        let mut notices = controller.notices().subscribe();

        let decision = controller.ensure_step_access(StepKey::Concept);
        assert_eq!(decision.reason(), Some(AccessReason::DiagnosisMissing));
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.kind, NoticeKind::AccessDenied);
        assert_eq!(notice.message, AccessReason::DiagnosisMissing.message());
    }

    #[test]
    fn test_enter_step_moves_marker_only_when_allowed() {
        let (controller, _, _) = setup();
        with_diagnosis(&controller);
        controller.start_brand_flow(None);

        assert!(!controller.enter_step(StepKey::Concept).ok());
        assert_eq!(
            controller.read().brand_flow.unwrap().current_step(),
            StepKey::Naming
        );

        offer(&controller, StepKey::Naming, &["n1"]);
        controller.confirm_selection(StepKey::Naming, "n1").unwrap();
        assert!(controller.enter_step(StepKey::Concept).ok());
        assert_eq!(
            controller.read().brand_flow.unwrap().current_step(),
            StepKey::Concept
        );
        assert_eq!(
            controller.enter_step(StepKey::Naming).reason(),
            Some(AccessReason::NoBack)
        );
    }

    #[test]
    fn test_confirm_selection_errors() {
        let (controller, _, _) = setup();
        with_diagnosis(&controller);

        let locked = controller.confirm_selection(StepKey::Concept, "c1");
        assert!(matches!(
            locked,
            Err(FlowError::StepLocked {
                reason: AccessReason::NamingMissing,
                ..
            })
        ));

        offer(&controller, StepKey::Naming, &["n1"]);
        let unknown = controller.confirm_selection(StepKey::Naming, "zzz");
        assert!(matches!(unknown, Err(FlowError::UnknownCandidate { .. })));
    }

    #[test]
    fn test_reselecting_earlier_step_cascades() {
        let (controller, _, clock) = setup();
        with_diagnosis(&controller);
        offer(&controller, StepKey::Naming, &["n1", "n2"]);
        controller.confirm_selection(StepKey::Naming, "n1").unwrap();
        offer(&controller, StepKey::Concept, &["c1"]);
        controller.confirm_selection(StepKey::Concept, "c1").unwrap();

        // Same choice again keeps later work.
        clock.advance(Duration::seconds(1));
        let doc = controller.confirm_selection(StepKey::Naming, "n1").unwrap();
        assert!(doc.is_done(StepKey::Concept));

        let doc = controller.confirm_selection(StepKey::Naming, "n2").unwrap();
        assert!(doc.step(StepKey::Concept).is_none());
        assert_eq!(
            controller.get_selected(StepKey::Naming).map(|c| c.id),
            Some("n2".to_string())
        );
    }

    #[test]
    fn test_confirming_logo_completes_flow() {
        let (controller, _, _) = setup();
        with_diagnosis(&controller);
        controller.start_brand_flow(None);
        for step in StepKey::ORDER {
            offer(&controller, step, &[step.as_str()]);
            controller.enter_step(step);
            controller.confirm_selection(step, step.as_str()).unwrap();
        }

        let doc = controller.read();
        assert!(matches!(doc.brand_flow, Some(FlowState::Completed { .. })));
        assert!(doc.all_steps_complete());
    }

    #[test]
    fn test_reset_all_purges_legacy_keys() {
        let (controller, storage, _) = setup();
        with_diagnosis(&controller);
        storage.set("diagnosisDraft_v1", "{}").unwrap();
        storage.set("brandStoryInterview_v1", "{}").unwrap();
        storage.set("unrelated", "{}").unwrap();

        controller.reset_all();
        assert_eq!(controller.read(), PipelineDocument::default());
        let mut keys = storage.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["unrelated".to_string()]);
    }
}
