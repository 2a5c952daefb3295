//! Persona domain types.
//!
//! A persona is a named configuration of system prompt and scope-validation
//! policy. The registry that holds the built-in personas lives in the agent
//! crate; this module only defines the shapes.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Identifier of a built-in persona.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaId {
    /// GLP-1 medications and related dietary topics
    Glp1,
    /// General medical information
    #[default]
    GeneralMed,
}

impl PersonaId {
    pub const ALL: [PersonaId; 2] = [PersonaId::Glp1, PersonaId::GeneralMed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Glp1 => "glp1",
            Self::GeneralMed => "general_med",
        }
    }

    /// Parse a persona identifier. Matching is exact.
    pub fn parse(id: &str) -> Result<Self, QueryError> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == id)
            .ok_or_else(|| QueryError::UnknownPersona(id.to_string()))
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PersonaId {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// How a domain-relevant query is checked against a persona's scope before
/// it is answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScopeValidation {
    /// No secondary check; the system prompt limits scope itself.
    None,
    /// The query must contain at least one keyword (case-insensitive).
    Keywords { keywords: Vec<String> },
    /// A binary external relevance check using `instruction` as system prompt.
    Model { instruction: String },
}

/// A persona's full prompt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub id: PersonaId,

    /// Short human-readable name of the persona's topic scope
    pub scope: String,

    pub system_prompt: String,

    pub validation: ScopeValidation,

    /// Extra instruction appended to the user text on the blocking path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_suffix: Option<String>,
}
