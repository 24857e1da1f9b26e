//! Pipeline Store - read/merge/write primitives over one document

use crate::storage::KeyValueStorage;
use chrono::{DateTime, Utc};
use pipeline_core::{
    Clock, DiagnosisSummary, FlowState, PipelineDocument, StepKey, StepState, SystemClock,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key of the canonical pipeline document.
pub const DEFAULT_PIPELINE_KEY: &str = "brandPipeline_v1";

/// Top-level fields to replace on the current document.
///
/// `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct PipelinePatch {
    pub diagnosis_summary: Option<DiagnosisSummary>,
    pub steps: Option<BTreeMap<StepKey, StepState>>,
    pub brand_id: Option<String>,
    pub brand_flow: Option<FlowState>,
}

impl PipelinePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnosis_summary(mut self, summary: DiagnosisSummary) -> Self {
        self.diagnosis_summary = Some(summary);
        self
    }

    pub fn steps(mut self, steps: BTreeMap<StepKey, StepState>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn brand_id(mut self, brand_id: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id.into());
        self
    }

    pub fn brand_flow(mut self, flow: FlowState) -> Self {
        self.brand_flow = Some(flow);
        self
    }

    fn apply(self, doc: &mut PipelineDocument) {
        if let Some(summary) = self.diagnosis_summary {
            doc.diagnosis_summary = Some(summary);
        }
        if let Some(steps) = self.steps {
            doc.steps = steps;
        }
        if let Some(brand_id) = self.brand_id {
            doc.brand_id = Some(brand_id);
        }
        if let Some(flow) = self.brand_flow {
            doc.brand_flow = Some(flow);
        }
    }
}

/// Single-document persistence of the consulting pipeline.
///
/// Last writer wins at whole-document granularity. Every mutation is a full
/// read-modify-write so a stale copy can clobber newer data but never produce a
/// structurally invalid document.
#[derive(Clone)]
pub struct PipelineStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    clock: Arc<dyn Clock>,
}

impl PipelineStore {
    /// Create a store over `storage` using the default key and the wall clock.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            key: DEFAULT_PIPELINE_KEY.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current document. Missing or corrupt data reads as an empty document.
    pub fn read(&self) -> PipelineDocument {
        self.read_record(&self.key).unwrap_or_default()
    }

    /// Stamp `updated_at`, persist, and return the stamped copy.
    ///
    /// Persistence failures are logged and swallowed.
    pub fn write(&self, mut doc: PipelineDocument) -> PipelineDocument {
        doc.updated_at = Some(self.now());
        self.write_record(&self.key, &doc);
        doc
    }

    /// Shallow-merge `patch` onto the current document, then write.
    pub fn merge(&self, patch: PipelinePatch) -> PipelineDocument {
        self.update(|doc| patch.apply(doc))
    }

    /// Read-modify-write with an arbitrary mutation.
    pub fn update<F>(&self, f: F) -> PipelineDocument
    where
        F: FnOnce(&mut PipelineDocument),
    {
        let mut doc = self.read();
        f(&mut doc);
        self.write(doc)
    }

    /// Remove the canonical document entirely.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(&self.key) {
            warn!(key = %self.key, error = %e, "Failed to clear pipeline document");
        }
    }

    /// Raw JSON of a superseded storage key, if present and parseable.
    pub fn read_legacy(&self, key: &str) -> Option<Value> {
        self.read_record(key)
    }

    /// Remove the given keys, returning how many were present.
    pub fn purge_keys<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut removed = 0;
        for key in keys {
            match self.storage.get(key) {
                Ok(Some(_)) => match self.storage.remove(key) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(key = %key, error = %e, "Failed to purge storage key"),
                },
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to inspect storage key"),
            }
        }
        if removed > 0 {
            debug!(removed, "Purged storage keys");
        }
        removed
    }

    /// Best-effort typed read of any key.
    pub fn read_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage read failed, treating as empty");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt stored record, treating as empty");
                None
            }
        }
    }

    /// Best-effort typed write of any key. Returns whether the write landed.
    pub fn write_record<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize record");
                return false;
            }
        };
        match self.storage.set(key, &raw) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage write failed, dropping update");
                false
            }
        }
    }
}

impl std::fmt::Debug for PipelineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
