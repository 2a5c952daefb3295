//! Nutritional assessment records produced from image analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The four fixed health labels a meal can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NutritionCategory {
    ClearlyHealthy,
    Borderline,
    Mixed,
    ClearlyUnhealthy,
}

impl NutritionCategory {
    pub const ALL: [NutritionCategory; 4] = [
        NutritionCategory::ClearlyHealthy,
        NutritionCategory::Borderline,
        NutritionCategory::Mixed,
        NutritionCategory::ClearlyUnhealthy,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::ClearlyHealthy => "Clearly Healthy",
            Self::Borderline => "Borderline",
            Self::Mixed => "Mixed",
            Self::ClearlyUnhealthy => "Clearly Unhealthy",
        }
    }

    /// Match a label case-insensitively, ignoring surrounding whitespace,
    /// brackets and markdown emphasis.
    pub fn from_label(text: &str) -> Option<Self> {
        let cleaned = text
            .trim()
            .trim_matches(|c: char| matches!(c, '[' | ']' | '*' | '_' | '"'))
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(&cleaned))
    }
}

impl std::fmt::Display for NutritionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A line-level finding recorded while parsing model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParseDiagnostic {
    /// A line outside body mode that matched no label.
    UnmatchedLine { line_no: usize, text: String },
    /// `Category:` carried a value outside the four fixed labels.
    UnknownCategory { text: String },
    /// `Confidence:` could not be parsed as a number.
    InvalidConfidence { text: String },
    /// `Confidence:` was outside [0, 100] and was clamped.
    ConfidenceClamped { raw: f64 },
    /// An expected label never appeared.
    MissingLabel { label: String },
}

/// The structured result of a food image analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionAnalysis {
    /// `None` means the category was missing or unparseable; serialized as "".
    #[serde(
        serialize_with = "serialize_category",
        deserialize_with = "deserialize_category"
    )]
    pub category: Option<NutritionCategory>,

    /// Always within [0, 100].
    pub confidence: f64,

    pub body: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl NutritionAnalysis {
    /// Whether every expected label was present and well-formed.
    pub fn is_complete(&self) -> bool {
        self.diagnostics.iter().all(|d| {
            !matches!(
                d,
                ParseDiagnostic::MissingLabel { .. }
                    | ParseDiagnostic::UnknownCategory { .. }
                    | ParseDiagnostic::InvalidConfidence { .. }
            )
        })
    }
}

fn serialize_category<S: Serializer>(
    category: &Option<NutritionCategory>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(category.map(|c| c.label()).unwrap_or(""))
}

fn deserialize_category<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NutritionCategory>, D::Error> {
    let text = String::deserialize(deserializer)?;
    Ok(NutritionCategory::from_label(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_case_insensitively() {
        assert_eq!(
            NutritionCategory::from_label("clearly healthy"),
            Some(NutritionCategory::ClearlyHealthy)
        );
        assert_eq!(
            NutritionCategory::from_label("  [Mixed] "),
            Some(NutritionCategory::Mixed)
        );
        assert_eq!(
            NutritionCategory::from_label("**Clearly   Unhealthy**"),
            Some(NutritionCategory::ClearlyUnhealthy)
        );
        assert_eq!(NutritionCategory::from_label("Healthy-ish"), None);
    }

    #[test]
    fn unparseable_category_serializes_as_empty_string() {
        let analysis = NutritionAnalysis {
            category: None,
            confidence: 0.0,
            body: String::new(),
            timestamp: Utc::now(),
            diagnostics: vec![],
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["category"], "");
        assert!(json.get("diagnostics").is_none());
    }

    #[test]
    fn completeness_ignores_soft_diagnostics() {
        let analysis = NutritionAnalysis {
            category: Some(NutritionCategory::Borderline),
            confidence: 100.0,
            body: "ok".into(),
            timestamp: Utc::now(),
            diagnostics: vec![
                ParseDiagnostic::ConfidenceClamped { raw: 120.0 },
                ParseDiagnostic::UnmatchedLine {
                    line_no: 1,
                    text: "Here is my analysis".into(),
                },
            ],
        };
        assert!(analysis.is_complete());
    }
}
