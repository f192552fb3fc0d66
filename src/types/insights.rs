use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::EverwellError;

pub const MAX_SUMMARY_CHARS: usize = 1500;
pub const MAX_RECOMMENDATIONS: usize = 6;
pub const MAX_RECOMMENDATION_CHARS: usize = 300;

/// What the model is asked to produce.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    /// Retrospective coaching summary of the window.
    #[default]
    Summary,
    /// Forward-looking plan for the coming week.
    Plan,
}

impl InsightKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Plan => "plan",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Summary => {
                "You are a supportive health coach. You receive a JSON summary of one person's \
                 self-tracked health metrics. Write a short, encouraging summary of the trends \
                 you see and up to six concrete, practical recommendations. Do not diagnose \
                 conditions or give medical advice; suggest seeing a professional when values \
                 look concerning. Respond only with JSON matching the schema."
            }
            Self::Plan => {
                "You are a supportive health coach. You receive a JSON summary of one person's \
                 self-tracked health metrics. Write a brief overview of where they stand and a \
                 plan for the next seven days as up to six specific, achievable actions. Do not \
                 diagnose conditions or give medical advice. Respond only with JSON matching \
                 the schema."
            }
        }
    }
}

/// Everything a provider needs to generate one insight.
#[derive(Debug, Clone, Serialize)]
pub struct InsightRequest {
    pub kind: InsightKind,
    pub payload: Value,
}

/// Structured model output, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightDraft {
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl InsightDraft {
    /// JSON schema sent as the `response_format` of the chat completion.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["summary", "recommendations"],
            "properties": {
                "summary": { "type": "string" },
                "recommendations": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            }
        })
    }

    /// Trim and check the draft; the model is not trusted to honor the schema limits.
    pub fn validate(self) -> Result<Self, EverwellError> {
        let summary = self.summary.trim().to_string();
        if summary.is_empty() {
            return Err(EverwellError::InvalidAiResponse("empty summary".into()));
        }
        if summary.chars().count() > MAX_SUMMARY_CHARS {
            return Err(EverwellError::InvalidAiResponse("summary too long".into()));
        }

        let recommendations: Vec<String> = self
            .recommendations
            .into_iter()
            .map(|r| r.trim().to_string())
            .collect();
        if recommendations.is_empty() || recommendations.len() > MAX_RECOMMENDATIONS {
            return Err(EverwellError::InvalidAiResponse(format!(
                "expected 1-{MAX_RECOMMENDATIONS} recommendations, got {}",
                recommendations.len()
            )));
        }
        if let Some(bad) = recommendations
            .iter()
            .find(|r| r.is_empty() || r.chars().count() > MAX_RECOMMENDATION_CHARS)
        {
            return Err(EverwellError::InvalidAiResponse(format!(
                "recommendation out of bounds ({} chars)",
                bad.chars().count()
            )));
        }

        Ok(Self {
            summary,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(summary: &str, recs: &[&str]) -> InsightDraft {
        InsightDraft {
            summary: summary.to_string(),
            recommendations: recs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn validate_trims_fields() {
        let ok = draft("  Sleep improved.  ", &[" Walk after lunch "])
            .validate()
            .unwrap();
        assert_eq!(ok.summary, "Sleep improved.");
        assert_eq!(ok.recommendations, vec!["Walk after lunch"]);
    }

    #[test]
    fn validate_rejects_empty_summary_and_recommendation_counts() {
        assert!(draft("   ", &["a"]).validate().is_err());
        assert!(draft("fine", &[]).validate().is_err());
        assert!(draft("fine", &["a"; MAX_RECOMMENDATIONS + 1]).validate().is_err());
        assert!(draft("fine", &["a", "  "]).validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_text() {
        let long = "x".repeat(MAX_SUMMARY_CHARS + 1);
        assert!(draft(&long, &["a"]).validate().is_err());
        let long_rec = "y".repeat(MAX_RECOMMENDATION_CHARS + 1);
        assert!(draft("fine", &[long_rec.as_str()]).validate().is_err());
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_value(InsightKind::Plan).unwrap(), json!("plan"));
        let parsed: InsightKind = serde_json::from_value(json!("summary")).unwrap();
        assert_eq!(parsed, InsightKind::Summary);
    }
}
