//! Step keys - the four ordered consulting stages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the four consulting steps.
///
/// The derived ordering is the canonical order: naming < concept < story < logo.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Naming,
    Concept,
    Story,
    Logo,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown step key: {0}")]
pub struct ParseStepKeyError(pub String);

impl StepKey {
    /// Canonical order of the flow.
    pub const ORDER: [StepKey; 4] = [
        StepKey::Naming,
        StepKey::Concept,
        StepKey::Story,
        StepKey::Logo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naming => "naming",
            Self::Concept => "concept",
            Self::Story => "story",
            Self::Logo => "logo",
        }
    }

    /// Position in the canonical order (0-based).
    pub fn index(&self) -> usize {
        match self {
            Self::Naming => 0,
            Self::Concept => 1,
            Self::Story => 2,
            Self::Logo => 3,
        }
    }

    /// The step directly before this one, if any.
    pub fn previous(&self) -> Option<StepKey> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }

    /// The step directly after this one, if any.
    pub fn next(&self) -> Option<StepKey> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    /// Every step strictly before this one, in canonical order.
    pub fn predecessors(&self) -> &'static [StepKey] {
        &Self::ORDER[..self.index()]
    }

    /// This step and every step after it, in canonical order.
    pub fn this_and_later(&self) -> &'static [StepKey] {
        &Self::ORDER[self.index()..]
    }

    /// Canonical route of the step's page.
    pub fn route(&self) -> &'static str {
        match self {
            Self::Naming => "/brand/naming/interview",
            Self::Concept => "/brand/concept/interview",
            Self::Story => "/brand/story",
            Self::Logo => "/brand/logo/interview",
        }
    }

    /// Human readable label used in notices and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Naming => "Naming",
            Self::Concept => "Concept",
            Self::Story => "Brand story",
            Self::Logo => "Logo",
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKey {
    type Err = ParseStepKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naming" => Ok(Self::Naming),
            "concept" => Ok(Self::Concept),
            "story" => Ok(Self::Story),
            "logo" => Ok(Self::Logo),
            other => Err(ParseStepKeyError(other.to_string())),
        }
    }
}
