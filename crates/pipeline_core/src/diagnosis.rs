//! Diagnosis summary - normalized upstream intake

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Normalized result of the diagnosis intake form.
///
/// Written once per diagnosis submission and never edited field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisSummary {
    #[serde(default, deserialize_with = "lenient_text")]
    pub company_name: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub industry: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub stage: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub target_persona: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub one_line: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub goal: String,

    /// Up to four salient fields joined for compact display.
    #[serde(default, deserialize_with = "lenient_text")]
    pub short_text: String,
}

/// Null or non-text values read as an empty field instead of failing the summary.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

impl DiagnosisSummary {
    /// True when no canonical field carries a value.
    pub fn is_empty(&self) -> bool {
        [
            &self.company_name,
            &self.industry,
            &self.stage,
            &self.target_persona,
            &self.one_line,
            &self.goal,
            &self.short_text,
        ]
        .iter()
        .all(|field| field.trim().is_empty())
    }
}
