//! Structured-Text Parser for nutrition analyses.
//!
//! Single pass over the lines of a model answer shaped like:
//!
//! ```text
//! Category: Clearly Healthy
//! Confidence: 85%
//! Analysis:
//! ...free text...
//! ```
//!
//! `Category:` and `Confidence:` are recognised in any state, so label order
//! does not matter. `Analysis:` switches to body mode; non-label lines are
//! then kept verbatim. Anything that does not fit is recorded as a
//! diagnostic instead of being dropped silently.

use chrono::Utc;
use medassist_core::nutrition::{NutritionAnalysis, NutritionCategory, ParseDiagnostic};

const CATEGORY_LABEL: &str = "Category:";
const CONFIDENCE_LABEL: &str = "Confidence:";
const ANALYSIS_LABEL: &str = "Analysis:";

/// Parse a free-text analysis. Never fails; missing or malformed parts
/// fall back to empty/zero defaults and are listed in `diagnostics`.
pub fn parse(raw: &str) -> NutritionAnalysis {
    let mut category = None;
    let mut confidence = 0.0_f64;
    let mut body: Vec<&str> = Vec::new();
    let mut diagnostics = Vec::new();

    let mut saw_category = false;
    let mut saw_confidence = false;
    let mut in_body = false;

    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim_start();

        if let Some(rest) = trimmed.strip_prefix(CATEGORY_LABEL) {
            saw_category = true;
            let text = rest.trim();
            category = NutritionCategory::from_label(text);
            if category.is_none() {
                diagnostics.push(ParseDiagnostic::UnknownCategory { text: text.into() });
            }
        } else if let Some(rest) = trimmed.strip_prefix(CONFIDENCE_LABEL) {
            saw_confidence = true;
            let (value, diagnostic) = parse_confidence(rest);
            confidence = value;
            diagnostics.extend(diagnostic);
        } else if let Some(rest) = trimmed.strip_prefix(ANALYSIS_LABEL) {
            in_body = true;
            let rest = rest.trim();
            if !rest.is_empty() {
                body.push(rest);
            }
        } else if in_body {
            body.push(line);
        } else if !trimmed.is_empty() {
            diagnostics.push(ParseDiagnostic::UnmatchedLine {
                line_no: idx + 1,
                text: line.to_string(),
            });
        }
    }

    for (seen, label) in [
        (saw_category, "Category"),
        (saw_confidence, "Confidence"),
        (in_body, "Analysis"),
    ] {
        if !seen {
            diagnostics.push(ParseDiagnostic::MissingLabel {
                label: label.into(),
            });
        }
    }

    NutritionAnalysis {
        category,
        confidence,
        body: join_body(&body),
        timestamp: Utc::now(),
        diagnostics,
    }
}

/// Parse `" 87%"` style values, clamping to [0, 100].
fn parse_confidence(rest: &str) -> (f64, Option<ParseDiagnostic>) {
    let text = rest.trim();
    let number = text.strip_suffix('%').unwrap_or(text).trim();

    match number.parse::<f64>() {
        Ok(value) if value.is_nan() => (
            0.0,
            Some(ParseDiagnostic::InvalidConfidence { text: text.into() }),
        ),
        Ok(value) if !(0.0..=100.0).contains(&value) => (
            value.clamp(0.0, 100.0),
            Some(ParseDiagnostic::ConfidenceClamped { raw: value }),
        ),
        Ok(value) => (value, None),
        Err(_) => (
            0.0,
            Some(ParseDiagnostic::InvalidConfidence { text: text.into() }),
        ),
    }
}

/// Newline-join, dropping blank lines at either end.
fn join_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}
