//! Caller-facing stream chunks.
//!
//! A request yields zero or more `Partial` chunks followed by exactly one
//! terminal chunk (`Complete` or `Failed`). Nothing follows a terminal chunk.

use chrono::{DateTime, Utc};
use medassist_core::classification::QueryCategory;
use medassist_core::error::ErrorRecord;
use medassist_core::persona::PersonaId;
use medassist_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// How a query was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Canned reply to a greeting, farewell or thanks
    Greeting,
    /// Classified as unrelated and refused
    Unrelated,
    /// Domain query rejected by the persona's scope check
    OutOfScope,
    /// Answered by the answering backend
    Answered,
}

impl Route {
    /// Whether the answering backend produced the text.
    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answered)
    }
}

/// Metadata attached to a `Complete` chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetadata {
    pub request_id: String,
    pub route: Route,
    pub persona: PersonaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<QueryCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CompletionMetadata {
    pub fn new(request_id: impl Into<String>, route: Route, persona: PersonaId) -> Self {
        Self {
            request_id: request_id.into(),
            route,
            persona,
            category: None,
            model: None,
            usage: None,
            disclaimer: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: Option<QueryCategory>) -> Self {
        self.category = category;
        self
    }

    pub fn with_disclaimer(mut self, disclaimer: impl Into<String>) -> Self {
        self.disclaimer = Some(disclaimer.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// An incremental text delta.
    Partial { content: String },

    /// The full text and its metadata.
    Complete {
        content: String,
        metadata: CompletionMetadata,
    },

    /// The request failed; no `Complete` follows.
    Failed { error: ErrorRecord },
}

impl StreamChunk {
    /// SSE event name for this chunk.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Partial { .. } => "partial",
            Self::Complete { .. } => "complete",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Partial { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medassist_core::error::{ErrorKind, ProviderError};

    #[test]
    fn partial_serialization() {
        let chunk = StreamChunk::Partial {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""type":"partial""#));
        assert!(json.contains(r#""content":"Hello""#));
        assert!(!chunk.is_terminal());
    }

    #[test]
    fn complete_serialization() {
        let chunk = StreamChunk::Complete {
            content: "Full".into(),
            metadata: CompletionMetadata::new("req", Route::Answered, PersonaId::Glp1)
                .with_category(Some(QueryCategory::Dosage))
                .with_disclaimer("Ask your doctor."),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""type":"complete""#));
        assert!(json.contains(r#""route":"answered""#));
        assert!(json.contains(r#""persona":"glp1""#));
        assert!(json.contains(r#""category":"dosage""#));
        assert!(!json.contains("usage"));
        assert!(chunk.is_terminal());
    }

    #[test]
    fn failed_serialization() {
        let chunk = StreamChunk::Failed {
            error: ErrorRecord::from(ProviderError::Network("down".into())),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""type":"failed""#));
        assert!(json.contains(r#""kind":"transport_failure""#));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            StreamChunk::Partial {
                content: "x".into()
            }
            .event_type(),
            "partial"
        );
        let failed = StreamChunk::Failed {
            error: ErrorRecord {
                kind: ErrorKind::TransportFailure,
                message: "x".into(),
                timestamp: Utc::now(),
            },
        };
        assert_eq!(failed.event_type(), "failed");
    }

    #[test]
    fn chunk_deserialization() {
        let json = r#"{"type":"partial","content":"hi"}"#;
        let chunk: StreamChunk = serde_json::from_str(json).unwrap();
        assert_eq!(
            chunk,
            StreamChunk::Partial {
                content: "hi".into()
            }
        );
    }
}
