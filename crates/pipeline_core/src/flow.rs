//! Flow state - the strict traversal state machine
//!
//! ```text
//! inactive --start--> naming --advance--> concept --advance--> story --advance--> logo --complete--> inactive
//!     ^                  |                   |                   |                  |
//!     +------------------+-------abort-------+-------------------+------------------+
//! ```
//!
//! Persisted as the flat record older front ends wrote (`active`, `currentStep`,
//! `pendingAbort`, ...), converted into an explicit sum type on load.

use crate::step::StepKey;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A suspected interruption, surfaced once on the next load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAbort {
    pub reason: String,
}

/// Lifecycle of a strict traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FlowRecord", into = "FlowRecord")]
pub enum FlowState {
    /// A strict traversal is in progress.
    Active {
        current_step: StepKey,
        started_at: Option<DateTime<Utc>>,
        pending_abort: Option<PendingAbort>,
    },

    /// The user gave up mid-flow; step data has been cleared.
    Aborted {
        reason: Option<String>,
        started_at: Option<DateTime<Utc>>,
        aborted_at: Option<DateTime<Utc>>,
    },

    /// The last step's selection was confirmed.
    Completed {
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    },
}

impl FlowState {
    /// Fresh flow positioned on the first step.
    pub fn start(now: DateTime<Utc>) -> Self {
        Self::Active {
            current_step: StepKey::Naming,
            started_at: Some(now),
            pending_abort: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// The step the user is currently permitted to be on.
    pub fn current_step(&self) -> StepKey {
        match self {
            Self::Active { current_step, .. } => *current_step,
            Self::Aborted { .. } => StepKey::Naming,
            Self::Completed { .. } => StepKey::Logo,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active { started_at, .. }
            | Self::Aborted { started_at, .. }
            | Self::Completed { started_at, .. } => *started_at,
        }
    }

    pub fn pending_abort(&self) -> Option<&PendingAbort> {
        match self {
            Self::Active { pending_abort, .. } => pending_abort.as_ref(),
            _ => None,
        }
    }

    /// Move the current-step marker, clearing any pending abort.
    ///
    /// The marker never moves backwards while active. An aborted or missing flow is
    /// (re)started at `step`; a completed flow is left untouched.
    pub fn advance(previous: Option<&FlowState>, step: StepKey, now: DateTime<Utc>) -> Self {
        match previous {
            Some(Self::Active {
                current_step,
                started_at,
                ..
            }) => Self::Active {
                current_step: (*current_step).max(step),
                started_at: *started_at,
                pending_abort: None,
            },
            Some(completed @ Self::Completed { .. }) => completed.clone(),
            Some(Self::Aborted { .. }) | None => Self::Active {
                current_step: step,
                started_at: Some(now),
                pending_abort: None,
            },
        }
    }

    /// Give up mid-flow. Valid from any state, including no flow at all.
    pub fn abort(previous: Option<&FlowState>, reason: &str, now: DateTime<Utc>) -> Self {
        Self::Aborted {
            reason: Some(reason.to_string()),
            started_at: previous.and_then(FlowState::started_at),
            aborted_at: Some(now),
        }
    }

    /// Natural end after the last step.
    pub fn complete(previous: Option<&FlowState>, now: DateTime<Utc>) -> Self {
        Self::Completed {
            started_at: previous.and_then(FlowState::started_at),
            completed_at: Some(now),
        }
    }

    /// Flag a suspected interruption. Returns `None` when no flow is active.
    pub fn with_pending_abort(&self, reason: &str) -> Option<Self> {
        match self {
            Self::Active {
                current_step,
                started_at,
                ..
            } => Some(Self::Active {
                current_step: *current_step,
                started_at: *started_at,
                pending_abort: Some(PendingAbort {
                    reason: reason.to_string(),
                }),
            }),
            _ => None,
        }
    }

    /// Split off the pending-abort flag, returning the cleared state and the flag.
    pub fn take_pending_abort(&self) -> (Self, Option<PendingAbort>) {
        match self {
            Self::Active {
                current_step,
                started_at,
                pending_abort,
            } => (
                Self::Active {
                    current_step: *current_step,
                    started_at: *started_at,
                    pending_abort: None,
                },
                pending_abort.clone(),
            ),
            other => (other.clone(), None),
        }
    }
}

/// Flat on-disk shape of a flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowRecord {
    #[serde(default)]
    active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_step: Option<StepKey>,

    #[serde(default)]
    pending_abort: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_reason: Option<String>,

    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    aborted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    abort_reason: Option<String>,

    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl From<FlowRecord> for FlowState {
    fn from(record: FlowRecord) -> Self {
        if record.active {
            let pending_abort = record.pending_abort.then(|| PendingAbort {
                reason: record.pending_reason.unwrap_or_else(|| "unknown".to_string()),
            });
            return Self::Active {
                current_step: record.current_step.unwrap_or(StepKey::Naming),
                started_at: record.started_at,
                pending_abort,
            };
        }

        // An inactive record that finished after its last abort is a completion.
        let completed_last = match (record.completed_at, record.aborted_at) {
            (Some(completed), Some(aborted)) => completed >= aborted,
            (Some(_), None) => true,
            _ => false,
        };
        if completed_last {
            Self::Completed {
                started_at: record.started_at,
                completed_at: record.completed_at,
            }
        } else {
            Self::Aborted {
                reason: record.abort_reason,
                started_at: record.started_at,
                aborted_at: record.aborted_at,
            }
        }
    }
}

impl From<FlowState> for FlowRecord {
    fn from(state: FlowState) -> Self {
        let current_step = Some(state.current_step());
        match state {
            FlowState::Active {
                started_at,
                pending_abort,
                ..
            } => FlowRecord {
                active: true,
                current_step,
                pending_abort: pending_abort.is_some(),
                pending_reason: pending_abort.map(|p| p.reason),
                started_at,
                ..Default::default()
            },
            FlowState::Aborted {
                reason,
                started_at,
                aborted_at,
            } => FlowRecord {
                current_step,
                started_at,
                aborted_at,
                abort_reason: reason,
                ..Default::default()
            },
            FlowState::Completed {
                started_at,
                completed_at,
            } => FlowRecord {
                current_step,
                started_at,
                completed_at,
                ..Default::default()
            },
        }
    }
}
