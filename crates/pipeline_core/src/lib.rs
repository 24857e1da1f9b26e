//! pipeline_core - Core types for the brand consulting pipeline
//!
//! This crate provides the data model shared by the store and the flow controller:
//! - `step` - StepKey and the canonical step order
//! - `routes` - canonical step routes and their deprecated aliases
//! - `document` - PipelineDocument, StepState, Candidate
//! - `flow` - FlowState, the strict traversal state machine
//! - `diagnosis` - DiagnosisSummary, the flow's precondition
//! - `clock` - time source used to stamp documents

pub mod clock;
pub mod diagnosis;
pub mod document;
pub mod flow;
pub mod routes;
pub mod step;
pub mod timestamp;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnosis::DiagnosisSummary;
pub use document::{Candidate, PipelineDocument, StepState};
pub use flow::{FlowState, PendingAbort};
pub use routes::{normalize_route, step_for_route, ROUTE_ALIASES};
pub use step::{ParseStepKeyError, StepKey};
