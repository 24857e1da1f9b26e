//! # Pipeline Store
//!
//! Persists the whole consulting pipeline as one document on top of a
//! key-value substrate. Reads never fail and writes are best-effort.

pub mod error;
pub mod storage;
pub mod store;

// Re-exports
pub use error::{Result, StorageError};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{PipelinePatch, PipelineStore, DEFAULT_PIPELINE_KEY};
