//! Step Access Guard
//!
//! Pure decisions over a `PipelineDocument`. Failures are values: callers
//! branch on them and redirect, nothing here returns an error.

use crate::config::DEFAULT_DIAGNOSIS_ROUTE;
use pipeline_core::{PipelineDocument, StepKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a step was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    DiagnosisMissing,
    NamingMissing,
    ConceptMissing,
    StoryMissing,
    /// Backward navigation during an active strict flow.
    NoBack,
}

impl AccessReason {
    /// The precondition-missing code for an unfinished predecessor step.
    ///
    /// `None` for logo, which no step depends on.
    pub fn missing(step: StepKey) -> Option<Self> {
        match step {
            StepKey::Naming => Some(Self::NamingMissing),
            StepKey::Concept => Some(Self::ConceptMissing),
            StepKey::Story => Some(Self::StoryMissing),
            StepKey::Logo => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiagnosisMissing => "diagnosis_missing",
            Self::NamingMissing => "naming_missing",
            Self::ConceptMissing => "concept_missing",
            Self::StoryMissing => "story_missing",
            Self::NoBack => "no_back",
        }
    }

    /// Text pushed to the notice panel.
    pub fn message(&self) -> &'static str {
        match self {
            Self::DiagnosisMissing => {
                "Please complete the diagnosis before starting the consulting flow."
            }
            Self::NamingMissing => "Please choose a name before moving on to the concept step.",
            Self::ConceptMissing => "Please choose a concept before moving on to the brand story.",
            Self::StoryMissing => "Please choose a brand story before moving on to the logo.",
            Self::NoBack => {
                "Earlier steps cannot be revisited while the consulting flow is in progress."
            }
        }
    }
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed,
    Denied {
        redirect_to: String,
        reason: AccessReason,
    },
}

impl AccessDecision {
    pub fn ok(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            Self::Denied { redirect_to, .. } => Some(redirect_to),
            Self::Allowed => None,
        }
    }

    pub fn reason(&self) -> Option<AccessReason> {
        match self {
            Self::Denied { reason, .. } => Some(*reason),
            Self::Allowed => None,
        }
    }

    fn denied(redirect_to: impl Into<String>, reason: AccessReason) -> Self {
        Self::Denied {
            redirect_to: redirect_to.into(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepGuard {
    diagnosis_route: String,
}

impl Default for StepGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSIS_ROUTE)
    }
}

impl StepGuard {
    pub fn new(diagnosis_route: impl Into<String>) -> Self {
        Self {
            diagnosis_route: diagnosis_route.into(),
        }
    }

    /// Ordering-only check. Returns on the first unmet precondition, in canonical order.
    pub fn ensure_step_access(&self, doc: &PipelineDocument, step: StepKey) -> AccessDecision {
        if !doc.has_diagnosis() {
            return AccessDecision::denied(&self.diagnosis_route, AccessReason::DiagnosisMissing);
        }
        let unmet = step
            .predecessors()
            .iter()
            .copied()
            .find(|k| !doc.is_done(*k))
            .and_then(|k| AccessReason::missing(k).map(|reason| (k, reason)));
        match unmet {
            Some((missing, reason)) => AccessDecision::denied(missing.route(), reason),
            None => AccessDecision::Allowed,
        }
    }

    /// Ordering check, then no-back while a strict flow is active.
    pub fn ensure_strict_step_access(
        &self,
        doc: &PipelineDocument,
        step: StepKey,
    ) -> AccessDecision {
        let decision = self.ensure_step_access(doc, step);
        if !decision.ok() {
            return decision;
        }
        match &doc.brand_flow {
            Some(flow) if flow.is_active() && step < flow.current_step() => {
                let current = flow.current_step();
                AccessDecision::denied(current.route(), AccessReason::NoBack)
            }
            _ => AccessDecision::Allowed,
        }
    }
}
