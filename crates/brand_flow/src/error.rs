//! Flow controller error types
//!
//! Guard failures are not errors; they come back as `AccessDecision` values.

use crate::guard::AccessReason;
use pipeline_core::StepKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Unknown candidate {candidate_id} for step {step}")]
    UnknownCandidate { step: StepKey, candidate_id: String },

    #[error("Step {step} is locked ({reason})")]
    StepLocked { step: StepKey, reason: AccessReason },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
