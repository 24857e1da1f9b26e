//! Leave-Flow Interceptor
//!
//! Split in two: `is_flow_exit` is a pure predicate over a route transition,
//! and `LeaveFlowInterceptor` performs the confirm / snapshot / reset side effects.

use crate::controller::FlowController;
use crate::notice::{FlowNotice, NoticeKind};
use crate::report::{build_report_snapshot, ReportHistory};
use pipeline_core::{step_for_route, StepKey};
use tracing::{debug, info, warn};

/// Abort reason recorded when the user confirms leaving an active flow.
pub const LEAVE_ROUTE_REASON: &str = "leave_route";

/// Pending-abort reason recorded when a step page unloads mid-flow.
pub const PAGE_UNLOAD_REASON: &str = "page_unload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    InFlow(StepKey),
    OutOfFlow,
}

/// Classify a path using canonical routes and their legacy aliases.
pub fn classify_route(path: &str) -> RouteClass {
    match step_for_route(path) {
        Some(step) => RouteClass::InFlow(step),
        None => RouteClass::OutOfFlow,
    }
}

/// True for an in-flow to out-of-flow transition while a strict flow is active.
pub fn is_flow_exit(from: &str, to: &str, flow_active: bool) -> bool {
    flow_active
        && matches!(classify_route(from), RouteClass::InFlow(_))
        && classify_route(to) == RouteClass::OutOfFlow
}

/// Asks the user whether to leave.
#[cfg_attr(test, mockall::automock)]
pub trait ConfirmPrompt {
    fn confirm(&self, message: &str) -> bool;
}

/// A prompt with a fixed answer, for non-interactive callers.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl ConfirmPrompt for FixedAnswer {
    fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Not an exit from an active flow; navigate as requested.
    Proceed { to: String },
    /// The user declined; stay on the in-flow route.
    Cancelled { stay_on: String },
    /// The user confirmed; the flow was reset and navigation forced to the entry route.
    Redirected { to: String, notice: FlowNotice },
}

impl NavigationOutcome {
    /// Where the browser ends up.
    pub fn destination(&self) -> &str {
        match self {
            Self::Proceed { to } | Self::Redirected { to, .. } => to,
            Self::Cancelled { stay_on } => stay_on,
        }
    }
}

pub struct LeaveFlowInterceptor<P: ConfirmPrompt> {
    controller: FlowController,
    history: ReportHistory,
    prompt: P,
}

impl<P: ConfirmPrompt> LeaveFlowInterceptor<P> {
    pub fn new(controller: FlowController, prompt: P) -> Self {
        let history = ReportHistory::from_config(controller.store().clone(), controller.config());
        Self {
            controller,
            history,
            prompt,
        }
    }

    pub fn history(&self) -> &ReportHistory {
        &self.history
    }

    /// Observe a route change. Runs on every transition, not only consulting pages.
    pub fn on_route_change(&self, from: &str, to: &str) -> NavigationOutcome {
        let flow_active = self.controller.read().flow_active();
        if !is_flow_exit(from, to, flow_active) {
            return NavigationOutcome::Proceed { to: to.to_string() };
        }

        let config = self.controller.config();
        if !self.prompt.confirm(&config.leave_confirm_message) {
            info!(from = %from, to = %to, "Leave cancelled, staying in flow");
            return NavigationOutcome::Cancelled {
                stay_on: from.to_string(),
            };
        }

        if config.snapshot_on_leave {
            self.snapshot_progress();
        }
        self.controller.abort_brand_flow(LEAVE_ROUTE_REASON);

        let notice = FlowNotice::new(NoticeKind::FlowReset, config.leave_notice_message.clone());
        self.controller.notices().publish(notice.clone());
        info!(from = %from, requested = %to, entry = %config.entry_route, "Left active flow, progress reset");

        NavigationOutcome::Redirected {
            to: config.entry_route.clone(),
            notice,
        }
    }

    /// The page is about to unload. Flags the active flow so the next load can react.
    pub fn on_page_unload(&self, current_route: &str) -> bool {
        match classify_route(current_route) {
            RouteClass::InFlow(_) => self
                .controller
                .mark_brand_flow_pending_abort(PAGE_UNLOAD_REASON),
            RouteClass::OutOfFlow => false,
        }
    }

    fn snapshot_progress(&self) {
        let doc = self.controller.read();
        match build_report_snapshot(&doc, self.controller.store().now(), true) {
            Ok(snapshot) => {
                if !self.history.archive(snapshot) {
                    warn!("Snapshot before leaving flow was not archived");
                }
            }
            Err(e) => debug!(error = %e, "No snapshot taken before leaving flow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrandFlowConfig;
    use crate::steps::StepResult;
    use mockall::predicate::eq;
    use pipeline_core::Candidate;
    use pipeline_store::MemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    fn controller() -> FlowController {
        FlowController::new(Arc::new(MemoryStorage::new()), BrandFlowConfig::default())
    }

    fn in_progress(controller: &FlowController) {
        controller.submit_diagnosis(&json!({"companyName": "Acme"}));
        controller.start_brand_flow(None);
        controller.set_step_result(
            StepKey::Naming,
            StepResult::new(vec![Candidate::new("n1")]).with_selected_id("n1"),
        );
        controller.set_brand_flow_current(StepKey::Concept);
    }

    #[test]
    fn test_classify_route_aliases() {
        assert_eq!(classify_route("/brand/story"), RouteClass::InFlow(StepKey::Story));
        assert_eq!(
            classify_route("/logoconsulting?tab=2"),
            RouteClass::InFlow(StepKey::Logo)
        );
        assert_eq!(
            classify_route("/HomepageConsulting/"),
            RouteClass::InFlow(StepKey::Concept)
        );
        assert_eq!(classify_route("/mypage"), RouteClass::OutOfFlow);
        assert_eq!(classify_route("/brand/storyboard"), RouteClass::OutOfFlow);
    }

    #[test]
    fn test_is_flow_exit() {
        assert!(is_flow_exit("/brand/concept/interview", "/mypage", true));
        assert!(!is_flow_exit("/brand/concept/interview", "/mypage", false));
        assert!(!is_flow_exit("/brand/naming/interview", "/brand/concept/interview", true));
        assert!(!is_flow_exit("/mypage", "/diagnosis", true));
    }

    #[test]
    fn test_inactive_flow_never_prompts() {
        let mut prompt = MockConfirmPrompt::new();
        prompt.expect_confirm().never();
        let interceptor = LeaveFlowInterceptor::new(controller(), prompt);

        let outcome = interceptor.on_route_change("/brand/naming/interview", "/mypage");
        assert_eq!(outcome, NavigationOutcome::Proceed { to: "/mypage".to_string() });
    }

    #[test]
    fn test_declined_leave_keeps_progress() {
        let controller = controller();
        in_progress(&controller);

        let mut prompt = MockConfirmPrompt::new();
        prompt
            .expect_confirm()
            .with(eq(BrandFlowConfig::default().leave_confirm_message))
            .times(1)
            .return_const(false);
        let interceptor = LeaveFlowInterceptor::new(controller.clone(), prompt);

        let outcome = interceptor.on_route_change("/brand/concept/interview", "/mypage");
        assert_eq!(outcome.destination(), "/brand/concept/interview");
        let doc = controller.read();
        assert!(doc.flow_active());
        assert!(doc.is_done(StepKey::Naming));
    }

    #[test]
    fn test_confirmed_leave_snapshots_resets_and_redirects() {
        let controller = controller();
        in_progress(&controller);
        let mut notices = controller.notices().subscribe();

        let mut prompt = MockConfirmPrompt::new();
        prompt.expect_confirm().times(1).return_const(true);
        let interceptor = LeaveFlowInterceptor::new(controller.clone(), prompt);

        let outcome = interceptor.on_route_change("/brand/concept/interview", "/mypage");
        match &outcome {
            NavigationOutcome::Redirected { to, notice } => {
                assert_eq!(to, "/brand/naming/interview");
                assert_eq!(notice.kind, NoticeKind::FlowReset);
                assert_eq!(&notices.try_recv().unwrap(), notice);
            }
            other => panic!("expected redirect, got {other:?}"),
        }

        let doc = controller.read();
        assert!(!doc.flow_active());
        assert!(doc.steps.is_empty());

        let archived = interceptor.history().list();
        assert_eq!(archived.len(), 1);
        assert!(!archived[0].complete);
        assert_eq!(archived[0].steps[0].selected_id.as_deref(), Some("n1"));
    }

    #[test]
    fn test_snapshot_disabled() {
        let config = BrandFlowConfig {
            snapshot_on_leave: false,
            ..Default::default()
        };
        let controller = FlowController::new(Arc::new(MemoryStorage::new()), config);
        in_progress(&controller);
        let interceptor = LeaveFlowInterceptor::new(controller, FixedAnswer(true));

        interceptor.on_route_change("/brand/concept/interview", "/");
        assert!(interceptor.history().list().is_empty());
    }

    #[test]
    fn test_page_unload_marks_pending_abort() {
        let controller = controller();
        let interceptor = LeaveFlowInterceptor::new(controller.clone(), FixedAnswer(true));
        assert!(!interceptor.on_page_unload("/brand/naming/interview"));

        in_progress(&controller);
        assert!(!interceptor.on_page_unload("/mypage"));
        assert!(interceptor.on_page_unload("/brand/concept/interview"));
        assert!(controller.recover_interrupted().is_some());
    }
}
