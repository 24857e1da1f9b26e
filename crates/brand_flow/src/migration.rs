//! Legacy Migration Adapter
//!
//! Imports results that older front ends stored under page-local keys into the
//! canonical pipeline document.
//!
//! # Staleness rule
//! A legacy step record is imported only when
//! 1. the canonical document does not already have the step done,
//! 2. its predecessor is done in the canonical document (`naming` needs a
//!    non-empty diagnosis summary instead), and
//! 3. it is strictly newer than the predecessor's `updated_at`.
//!
//! A record that fails (2) or (3) was made under an earlier choice that has
//! since changed; it is discarded. Steps are processed in canonical order so an
//! imported step can satisfy the next one. Running twice is a no-op.

use crate::diagnosis::build_diagnosis_summary_from_draft;
use crate::legacy::{diagnosis_form, legacy_keys_for, LegacyStepRecord, LEGACY_DIAGNOSIS_KEYS};
use chrono::{DateTime, Utc};
use pipeline_core::{PipelineDocument, StepKey};
use pipeline_store::PipelineStore;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Why a legacy record was not imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// `naming` record but no diagnosis summary.
    DiagnosisMissing,
    /// The predecessor step is not done.
    PredecessorNotDone,
    /// Written at or before the predecessor's last update.
    OlderThanPredecessor,
    /// No timestamp to compare against a timestamped predecessor.
    MissingTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscardedRecord {
    pub step: StepKey,
    pub key: String,
    pub reason: StaleReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Steps imported, with the legacy key each came from.
    pub imported: Vec<(StepKey, String)>,
    pub discarded: Vec<DiscardedRecord>,
    pub diagnosis_imported: bool,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.diagnosis_imported || !self.imported.is_empty()
    }
}

/// Reconcile legacy keys into the canonical document; writes only when something changed.
pub fn migrate_legacy_to_pipeline_if_needed(store: &PipelineStore) -> MigrationReport {
    let mut doc = store.read();
    let mut report = MigrationReport::default();

    if !doc.has_diagnosis() {
        report.diagnosis_imported = import_diagnosis(store, &mut doc);
    }

    for step in StepKey::ORDER {
        if doc.is_done(step) {
            continue;
        }
        if let Some((key, record)) = pick_legacy_record(store, &doc, step, &mut report) {
            info!(step = %step, key = %key, "Imported legacy step result");
            doc.steps.insert(step, record.state);
            report.imported.push((step, key.to_string()));
        }
    }

    if report.changed() {
        store.write(doc);
    } else {
        debug!("No legacy data to migrate");
    }
    report
}

fn import_diagnosis(store: &PipelineStore, doc: &mut PipelineDocument) -> bool {
    for key in LEGACY_DIAGNOSIS_KEYS {
        let Some(draft) = store.read_legacy(key) else {
            continue;
        };
        let Some(form) = diagnosis_form(&draft) else {
            continue;
        };
        let summary = build_diagnosis_summary_from_draft(form);
        if !summary.is_empty() {
            info!(key = %key, "Populated diagnosis summary from legacy draft");
            doc.diagnosis_summary = Some(summary);
            return true;
        }
    }
    false
}

/// Newest acceptable done record among the step's legacy keys.
fn pick_legacy_record(
    store: &PipelineStore,
    doc: &PipelineDocument,
    step: StepKey,
    report: &mut MigrationReport,
) -> Option<(&'static str, LegacyStepRecord)> {
    let mut best: Option<(&'static str, LegacyStepRecord)> = None;

    for key in legacy_keys_for(step) {
        let Some(record) = store
            .read_legacy(key)
            .as_ref()
            .and_then(LegacyStepRecord::from_value)
        else {
            continue;
        };
        if !record.is_done() {
            continue;
        }

        if let Err(reason) = check_freshness(doc, step, record.updated_at) {
            warn!(step = %step, key = %key, ?reason, "Discarding stale legacy record");
            report.discarded.push(DiscardedRecord {
                step,
                key: key.to_string(),
                reason,
            });
            continue;
        }

        let newer = match &best {
            Some((_, current)) => record.updated_at > current.updated_at,
            None => true,
        };
        if newer {
            best = Some((key, record));
        }
    }
    best
}

fn check_freshness(
    doc: &PipelineDocument,
    step: StepKey,
    legacy_updated_at: Option<DateTime<Utc>>,
) -> Result<(), StaleReason> {
    let Some(previous) = step.previous() else {
        return if doc.has_diagnosis() {
            Ok(())
        } else {
            Err(StaleReason::DiagnosisMissing)
        };
    };
    if !doc.is_done(previous) {
        return Err(StaleReason::PredecessorNotDone);
    }
    match (doc.step_updated_at(previous), legacy_updated_at) {
        (None, _) => Ok(()),
        (Some(_), None) => Err(StaleReason::MissingTimestamp),
        (Some(predecessor), Some(legacy)) if legacy > predecessor => Ok(()),
        (Some(_), Some(_)) => Err(StaleReason::OlderThanPredecessor),
    }
}
