//! Query classification types.

use serde::{Deserialize, Serialize};

/// The topic bucket of a domain-relevant query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    Dosage,
    SideEffects,
    Benefits,
    Storage,
    Lifestyle,
    Interactions,
    Cost,
    General,
}

/// Keyword sets checked in order; the first set with a substring match wins.
const CATEGORY_KEYWORDS: &[(QueryCategory, &[&str])] = &[
    (
        QueryCategory::Dosage,
        &["dose", "dosage", "how to take", "when to take", "injection", "administration"],
    ),
    (
        QueryCategory::SideEffects,
        &["side effect", "adverse", "reaction", "problem", "issues", "symptoms"],
    ),
    (
        QueryCategory::Benefits,
        &["benefit", "advantage", "help", "work", "effect", "weight", "glucose"],
    ),
    (
        QueryCategory::Storage,
        &["store", "storage", "keep", "refrigerate", "temperature"],
    ),
    (
        QueryCategory::Lifestyle,
        &["diet", "exercise", "lifestyle", "food", "alcohol", "eating"],
    ),
    (
        QueryCategory::Interactions,
        &["interaction", "drug", "medication", "combine", "mixing"],
    ),
    (
        QueryCategory::Cost,
        &["cost", "price", "insurance", "coverage", "afford"],
    ),
];

impl QueryCategory {
    /// Bucket a query by keyword. Falls back to `General`.
    pub fn from_query(query: &str) -> Self {
        let lower = query.to_lowercase();
        CATEGORY_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(category, _)| *category)
            .unwrap_or(QueryCategory::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dosage => "dosage",
            Self::SideEffects => "side_effects",
            Self::Benefits => "benefits",
            Self::Storage => "storage",
            Self::Lifestyle => "lifestyle",
            Self::Interactions => "interactions",
            Self::Cost => "cost",
            Self::General => "general",
        }
    }
}

/// The result of classifying one query. Produced fresh per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "label", content = "category", rename_all = "snake_case")]
pub enum QueryClassification {
    Greeting,
    DomainRelevant(QueryCategory),
    Unrelated,
}

impl QueryClassification {
    pub fn category(&self) -> Option<QueryCategory> {
        match self {
            Self::DomainRelevant(category) => Some(*category),
            _ => None,
        }
    }
}
