//! Diagnosis Summary Builder
//!
//! The diagnosis form went through several field namings. Each canonical field
//! takes the first non-empty value among its aliases.

use pipeline_core::DiagnosisSummary;
use serde_json::Value;

const COMPANY_NAME: &[&str] = &["companyName", "brandName", "projectName", "serviceName", "company"];
const INDUSTRY: &[&str] = &["industry", "category", "businessCategory", "sector"];
const STAGE: &[&str] = &["stage", "businessStage", "growthStage", "companyStage"];
const TARGET_PERSONA: &[&str] = &["targetPersona", "target", "targetCustomer", "persona", "customer"];
const ONE_LINE: &[&str] = &["oneLine", "oneLiner", "oneLineIntro", "summary", "intro"];
const GOAL: &[&str] = &["goal", "mainGoal", "primaryGoal", "objective"];

const SHORT_TEXT_SEPARATOR: &str = " · ";
const SHORT_TEXT_MAX_ITEMS: usize = 4;

/// Normalize a raw diagnosis form into the canonical summary. Pure.
pub fn build_diagnosis_summary_from_draft(raw_form: &Value) -> DiagnosisSummary {
    let pick = |aliases: &[&str]| -> String {
        aliases
            .iter()
            .filter_map(|key| raw_form.get(*key))
            .map(text_of)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    };

    let mut summary = DiagnosisSummary {
        company_name: pick(COMPANY_NAME),
        industry: pick(INDUSTRY),
        stage: pick(STAGE),
        target_persona: pick(TARGET_PERSONA),
        one_line: pick(ONE_LINE),
        goal: pick(GOAL),
        short_text: String::new(),
    };

    // Selection is capped at four items; the joined string itself is never cut.
    summary.short_text = [
        &summary.company_name,
        &summary.industry,
        &summary.stage,
        &summary.target_persona,
        &summary.one_line,
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .take(SHORT_TEXT_MAX_ITEMS)
    .map(String::as_str)
    .collect::<Vec<_>>()
    .join(SHORT_TEXT_SEPARATOR);

    summary
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_fields() {
        let summary = build_diagnosis_summary_from_draft(&json!({
            "companyName": "  Acme  ",
            "industry": "Aerospace",
            "stage": "Seed",
            "targetPersona": "Hobbyists",
            "oneLine": "Rockets for everyone",
            "goal": "Launch"
        }));
        assert_eq!(summary.company_name, "Acme");
        assert_eq!(summary.goal, "Launch");
        assert_eq!(summary.short_text, "Acme · Aerospace · Seed · Hobbyists");
    }

    #[test]
    fn test_alias_fallback_skips_blank_values() {
        let summary = build_diagnosis_summary_from_draft(&json!({
            "companyName": "   ",
            "brandName": "",
            "projectName": "Project X",
            "category": "Food",
            "target": ["students", " ", "parents"]
        }));
        assert_eq!(summary.company_name, "Project X");
        assert_eq!(summary.industry, "Food");
        assert_eq!(summary.target_persona, "students, parents");
        assert_eq!(summary.short_text, "Project X · Food · students, parents");
    }

    #[test]
    fn test_short_text_truncates_selection_not_string() {
        let long_name = "N".repeat(200);
        let summary = build_diagnosis_summary_from_draft(&json!({
            "companyName": long_name,
            "industry": "I",
            "stage": "S",
            "targetPersona": "T",
            "oneLine": "O"
        }));
        assert!(summary.short_text.starts_with(&long_name));
        assert!(summary.short_text.ends_with(" · T"));
        assert!(!summary.short_text.contains('O'));
    }

    #[test]
    fn test_empty_and_non_object_input() {
        assert!(build_diagnosis_summary_from_draft(&json!({})).is_empty());
        assert!(build_diagnosis_summary_from_draft(&json!("text")).is_empty());
        assert!(build_diagnosis_summary_from_draft(&json!({"stage": 3})).stage == "3");
    }

    #[test]
    fn test_idempotent() {
        let form = json!({"brandName": "Lumen", "sector": "Lighting"});
        assert_eq!(
            build_diagnosis_summary_from_draft(&form),
            build_diagnosis_summary_from_draft(&form)
        );
    }
}
