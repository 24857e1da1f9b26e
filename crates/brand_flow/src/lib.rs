//! brand_flow - Multi-step consulting flow controller
//!
//! Enforces the ordered naming → concept → story → logo sequence on top of the
//! pipeline document:
//! - `steps` - Step Result Manager (record/read selections, cascading invalidation)
//! - `diagnosis` - Diagnosis Summary Builder
//! - `migration` - Legacy Migration Adapter
//! - `guard` - Step Access Guard (ordering and strict no-back checks)
//! - `controller` - Flow Controller (start/advance/abort/complete)
//! - `interceptor` - Leave-Flow Interceptor
//! - `report` - Report snapshots and the history archive
//! - `notice` - broadcast of user-facing notices

pub mod config;
pub mod controller;
pub mod diagnosis;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod legacy;
pub mod migration;
pub mod notice;
pub mod report;
pub mod steps;

// Re-export commonly used types
pub use config::BrandFlowConfig;
pub use controller::FlowController;
pub use diagnosis::build_diagnosis_summary_from_draft;
pub use error::{FlowError, Result};
pub use guard::{AccessDecision, AccessReason, StepGuard};
pub use interceptor::{
    classify_route, is_flow_exit, ConfirmPrompt, FixedAnswer, LeaveFlowInterceptor,
    NavigationOutcome, RouteClass, LEAVE_ROUTE_REASON,
};
pub use migration::{
    migrate_legacy_to_pipeline_if_needed, DiscardedRecord, MigrationReport, StaleReason,
};
pub use notice::{FlowNotice, NoticeBus, NoticeKind};
pub use report::{
    build_report_snapshot, ReportError, ReportHistory, ReportSnapshot, StepReport, StepStatus,
};
pub use steps::{StepResult, StepResults};
