//! Flow configuration
//!
//! Loaded from a JSON or TOML file when one is given, then overridden by
//! environment variables:
//! - `BRAND_FLOW_STORAGE_KEY`: canonical document key (default: brandPipeline_v1)
//! - `BRAND_FLOW_HISTORY_KEY`: report history key (default: brandReportHistory_v1)
//! - `BRAND_FLOW_ENTRY_ROUTE`: where a confirmed leave lands (default: naming route)
//! - `BRAND_FLOW_DIAGNOSIS_ROUTE`: redirect when the diagnosis is missing (default: /diagnosis)
//! - `BRAND_FLOW_HISTORY_LIMIT`: archived snapshots kept (default: 20)
//! - `BRAND_FLOW_SNAPSHOT_ON_LEAVE`: archive a snapshot before a leave reset (default: true)

use crate::error::{FlowError, Result};
use pipeline_core::StepKey;
use pipeline_store::DEFAULT_PIPELINE_KEY;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_HISTORY_KEY: &str = "brandReportHistory_v1";
pub const DEFAULT_DIAGNOSIS_ROUTE: &str = "/diagnosis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandFlowConfig {
    pub storage_key: String,
    pub history_key: String,
    pub entry_route: String,
    pub diagnosis_route: String,
    pub history_limit: usize,
    pub snapshot_on_leave: bool,
    pub leave_confirm_message: String,
    pub leave_notice_message: String,
    pub interrupted_notice_message: String,
}

impl Default for BrandFlowConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_PIPELINE_KEY.to_string(),
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            entry_route: StepKey::Naming.route().to_string(),
            diagnosis_route: DEFAULT_DIAGNOSIS_ROUTE.to_string(),
            history_limit: 20,
            snapshot_on_leave: true,
            leave_confirm_message: "Leaving now will reset your consulting progress. \
                                    Do you want to leave?"
                .to_string(),
            leave_notice_message: "You left the consulting flow, so your progress was reset. \
                                   Please start again from naming."
                .to_string(),
            interrupted_notice_message: "Your previous consulting session was interrupted, \
                                         so your progress was reset."
                .to_string(),
        }
    }
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl BrandFlowConfig {
    /// Load from `path` (JSON by `.json` extension, TOML otherwise), then apply
    /// environment overrides. A missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FlowError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("BRAND_FLOW_STORAGE_KEY") {
            self.storage_key = key;
        }
        if let Ok(key) = std::env::var("BRAND_FLOW_HISTORY_KEY") {
            self.history_key = key;
        }
        if let Ok(route) = std::env::var("BRAND_FLOW_ENTRY_ROUTE") {
            self.entry_route = route;
        }
        if let Ok(route) = std::env::var("BRAND_FLOW_DIAGNOSIS_ROUTE") {
            self.diagnosis_route = route;
        }
        if let Some(limit) = std::env::var("BRAND_FLOW_HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.history_limit = limit;
        }
        if let Ok(value) = std::env::var("BRAND_FLOW_SNAPSHOT_ON_LEAVE") {
            self.snapshot_on_leave = parse_bool_env(&value);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(FlowError::Config("storage_key must not be empty".to_string()));
        }
        if self.storage_key == self.history_key {
            return Err(FlowError::Config(
                "storage_key and history_key must differ".to_string(),
            ));
        }
        if !self.entry_route.starts_with('/') {
            return Err(FlowError::Config(format!(
                "entry_route must be an absolute path: {}",
                self.entry_route
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn temp_with_suffix(suffix: &str) -> NamedTempFile {
        Builder::new().suffix(suffix).tempfile().unwrap()
    }

    #[test]
    fn parse_bool_env_values() {
        for value in ["1", "true", "TRUE", " yes ", "Y", "on"] {
            assert!(parse_bool_env(value), "value {value:?} should be true");
        }
        for value in ["0", "false", "no", "off", ""] {
            assert!(!parse_bool_env(value), "value {value:?} should be false");
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BrandFlowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.entry_route, "/brand/naming/interview");
        assert_eq!(config.storage_key, "brandPipeline_v1");
    }

    #[test]
    fn test_load_toml_partial() {
        let mut file = temp_with_suffix(".toml");
        writeln!(file, "history_limit = 5\nsnapshot_on_leave = false").unwrap();

        let config = BrandFlowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.history_limit, 5);
        assert!(!config.snapshot_on_leave);
        assert_eq!(config.history_key, DEFAULT_HISTORY_KEY);
    }

    #[test]
    fn test_load_json() {
        let mut file = temp_with_suffix(".json");
        write!(file, r#"{{"entry_route": "/brand/start"}}"#).unwrap();

        let config = BrandFlowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.entry_route, "/brand/start");
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = BrandFlowConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(FlowError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_shared_keys() {
        let config = BrandFlowConfig {
            history_key: DEFAULT_PIPELINE_KEY.to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
