//! Error types for the MedAssist domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    /// `retry_after_secs` is the upstream `Retry-After` value, when sent.
    #[error("Rate limited by provider (status: {status_code})")]
    RateLimited {
        status_code: u16,
        retry_after_secs: Option<u64>,
    },

    #[error("Authentication failed: {message} (status: {status_code})")]
    AuthenticationFailed { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// A single undecodable stream frame. Consumers skip it.
    #[error("Malformed stream frame: {0}")]
    MalformedFrame(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this error only affects one frame of a stream.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::MalformedFrame(_))
    }

    /// A caller-safe description: the status or failure class, never the
    /// upstream response body.
    pub fn summary(&self) -> String {
        match self {
            Self::ApiError { status_code, .. } => {
                format!("Upstream model returned status {status_code}")
            }
            Self::RateLimited {
                status_code,
                retry_after_secs: Some(secs),
            } => format!(
                "Upstream model returned status {status_code}: rate limited, retry after {secs}s"
            ),
            Self::RateLimited { status_code, .. } => {
                format!("Upstream model returned status {status_code}: rate limited")
            }
            Self::AuthenticationFailed { status_code, .. } => {
                format!("Upstream model returned status {status_code}: credentials rejected")
            }
            Self::StreamInterrupted(reason) => format!("Response stream interrupted: {reason}"),
            Self::MalformedFrame(_) => "Upstream model sent an undecodable frame".into(),
            Self::NotConfigured(reason) => format!("Backend not configured: {reason}"),
            Self::Timeout(reason) => format!("Upstream model timed out: {reason}"),
            Self::Network(reason) => format!("Network error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("Please enter a valid question.")]
    EmptyQuery,

    #[error("No image data provided.")]
    EmptyImage,

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("{}", .0.summary())]
    Transport(#[from] ProviderError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery => ErrorKind::EmptyQuery,
            Self::EmptyImage => ErrorKind::EmptyImage,
            Self::UnknownPersona(_) => ErrorKind::UnknownPersona,
            Self::Transport(_) => ErrorKind::TransportFailure,
        }
    }
}

/// Error taxonomy shared by error records and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyQuery,
    EmptyImage,
    UnknownPersona,
    ClassificationAmbiguous,
    TransportFailure,
    MalformedFrame,
    ParseIncomplete,
}

/// The user-facing shape of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&QueryError> for ErrorRecord {
    fn from(err: &QueryError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            timestamp: Utc::now(),
        }
    }
}

impl From<QueryError> for ErrorRecord {
    fn from(err: QueryError) -> Self {
        Self::from(&err)
    }
}

impl From<ProviderError> for ErrorRecord {
    fn from(err: ProviderError) -> Self {
        QueryError::Transport(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 500,
            message: "Internal".into(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("Internal"));
    }

    #[test]
    fn rate_limit_summary_keeps_status_and_retry_after() {
        let err = ProviderError::RateLimited {
            status_code: 429,
            retry_after_secs: Some(120),
        };
        let summary = err.summary();
        assert!(summary.contains("429"));
        assert!(summary.contains("120"));

        let err = ProviderError::RateLimited {
            status_code: 429,
            retry_after_secs: None,
        };
        assert!(err.summary().contains("429"));
        assert!(!err.summary().contains("retry after"));
    }

    #[test]
    fn auth_summary_keeps_status_but_not_message() {
        let record = ErrorRecord::from(ProviderError::AuthenticationFailed {
            status_code: 401,
            message: "key sk-abc is invalid".into(),
        });
        assert_eq!(record.kind, ErrorKind::TransportFailure);
        assert!(record.message.contains("401"));
        assert!(!record.message.contains("sk-abc"));
    }

    #[test]
    fn transport_record_hides_upstream_body() {
        let record = ErrorRecord::from(ProviderError::ApiError {
            status_code: 502,
            message: "<html>bad gateway stack trace</html>".into(),
        });
        assert_eq!(record.kind, ErrorKind::TransportFailure);
        assert!(record.message.contains("502"));
        assert!(!record.message.contains("stack trace"));
    }

    #[test]
    fn empty_query_message_is_verbatim() {
        let record = ErrorRecord::from(QueryError::EmptyQuery);
        assert_eq!(record.kind, ErrorKind::EmptyQuery);
        assert_eq!(record.message, "Please enter a valid question.");
    }

    #[test]
    fn only_malformed_frames_are_frame_local() {
        assert!(ProviderError::MalformedFrame("x".into()).is_frame_local());
        assert!(!ProviderError::Network("x".into()).is_frame_local());
        assert!(!ProviderError::Timeout("x".into()).is_frame_local());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TransportFailure).unwrap();
        assert_eq!(json, r#""transport_failure""#);
    }
}
