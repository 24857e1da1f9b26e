//! Report snapshots
//!
//! A point-in-time, read-only rendering of the pipeline for history pages.
//! Nothing here mutates the pipeline document.

use crate::config::BrandFlowConfig;
use chrono::{DateTime, Utc};
use pipeline_core::{DiagnosisSummary, PipelineDocument, StepKey};
use pipeline_store::PipelineStore;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Pipeline is incomplete: {0} has no valid selection")]
    Incomplete(StepKey),

    #[error("Nothing to report: no diagnosis and no step results")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Done and every earlier step done.
    Complete,
    /// Done, but an earlier step is not; the selection no longer counts.
    Stale,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: StepKey,
    pub label: String,
    pub status: StepStatus,
    pub selected_id: Option<String>,
    pub selected_title: Option<String>,
    pub candidate_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub brand_id: Option<String>,
    pub diagnosis: Option<DiagnosisSummary>,
    pub steps: Vec<StepReport>,
    pub complete: bool,
}

impl ReportSnapshot {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Brand report {}", self.id);
        let _ = writeln!(out, "Created: {}", self.created_at.to_rfc3339());
        if let Some(brand_id) = &self.brand_id {
            let _ = writeln!(out, "Brand: {}", brand_id);
        }
        match &self.diagnosis {
            Some(summary) if !summary.short_text.is_empty() => {
                let _ = writeln!(out, "Diagnosis: {}", summary.short_text);
            }
            _ => {
                let _ = writeln!(out, "Diagnosis: -");
            }
        }
        for step in &self.steps {
            let marker = match step.status {
                StepStatus::Complete => "[x]",
                StepStatus::Stale => "[!]",
                StepStatus::Pending => "[ ]",
            };
            let choice = step
                .selected_title
                .as_deref()
                .or(step.selected_id.as_deref())
                .unwrap_or("-");
            let _ = writeln!(
                out,
                "{} {}: {} ({} candidates)",
                marker, step.label, choice, step.candidate_count
            );
        }
        let _ = write!(
            out,
            "Status: {}",
            if self.complete { "complete" } else { "in progress" }
        );
        out
    }
}

/// Snapshot `doc`. Without `allow_incomplete` every step must be complete-and-valid.
pub fn build_report_snapshot(
    doc: &PipelineDocument,
    now: DateTime<Utc>,
    allow_incomplete: bool,
) -> Result<ReportSnapshot, ReportError> {
    if !doc.has_diagnosis() && doc.steps.is_empty() {
        return Err(ReportError::Empty);
    }
    if !allow_incomplete {
        if let Some(step) = StepKey::ORDER.into_iter().find(|k| !doc.is_complete(*k)) {
            return Err(ReportError::Incomplete(step));
        }
    }

    let steps = StepKey::ORDER
        .into_iter()
        .map(|key| {
            let state = doc.step(key);
            let selected = state.and_then(|s| s.resolve_selected());
            let status = if doc.is_complete(key) {
                StepStatus::Complete
            } else if doc.is_done(key) {
                StepStatus::Stale
            } else {
                StepStatus::Pending
            };
            StepReport {
                step: key,
                label: key.label().to_string(),
                status,
                selected_id: selected
                    .map(|c| c.id.clone())
                    .or_else(|| state.and_then(|s| s.selected_id.clone())),
                selected_title: selected.and_then(|c| c.title()).map(str::to_string),
                candidate_count: state.map_or(0, |s| s.candidates.len()),
            }
        })
        .collect();

    Ok(ReportSnapshot {
        id: Uuid::new_v4(),
        created_at: now,
        brand_id: doc.brand_id.clone(),
        diagnosis: doc.diagnosis_summary.clone(),
        steps,
        complete: doc.all_steps_complete(),
    })
}

/// Archived snapshots, newest first, under their own storage key.
#[derive(Debug, Clone)]
pub struct ReportHistory {
    store: PipelineStore,
    key: String,
    limit: usize,
}

impl ReportHistory {
    pub fn new(store: PipelineStore, key: impl Into<String>, limit: usize) -> Self {
        Self {
            store,
            key: key.into(),
            limit,
        }
    }

    pub fn from_config(store: PipelineStore, config: &BrandFlowConfig) -> Self {
        Self::new(store, config.history_key.clone(), config.history_limit)
    }

    pub fn list(&self) -> Vec<ReportSnapshot> {
        self.store.read_record(&self.key).unwrap_or_default()
    }

    /// Prepend `snapshot`, dropping the oldest beyond the limit. Best-effort.
    pub fn archive(&self, snapshot: ReportSnapshot) -> bool {
        let id = snapshot.id;
        let mut entries = self.list();
        entries.insert(0, snapshot);
        entries.truncate(self.limit.max(1));
        let written = self.store.write_record(&self.key, &entries);
        if written {
            debug!(%id, entries = entries.len(), "Report snapshot archived");
        } else {
            warn!(%id, "Report snapshot not archived");
        }
        written
    }

    pub fn clear(&self) {
        self.store.purge_keys([self.key.as_str()]);
    }
}
