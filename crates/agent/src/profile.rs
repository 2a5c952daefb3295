//! Profile Extractor — pulls a fixed field set out of free user text.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use medassist_core::error::QueryError;
use medassist_core::provider::{Provider, ProviderRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::timeouts::within;

const PERSONAL_INSTRUCTIONS: &str = "You are a medical system assistant collecting personal information.

OBJECTIVE:
Extract personal information from user input, focusing on three key fields:
1. name
2. age
3. location

RULES:
1. Only extract information that is explicitly stated
2. Format response as JSON: {\"name\": \"\", \"age\": \"\", \"location\": \"\"}
3. If a field is missing, leave it empty
4. For age, only accept numeric values";

const MEDICAL_INSTRUCTIONS: &str = "You are a medical system assistant collecting information about a patient's condition.

OBJECTIVE:
Extract medical information from user input, focusing on three key fields:
1. diagnosis
2. concern
3. target

RULES:
1. Only extract information that is explicitly stated
2. Format response as JSON: {\"diagnosis\": \"\", \"concern\": \"\", \"target\": \"\"}
3. If a field is missing, leave it empty
4. Keep medical terminology as stated by the user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Personal,
    Medical,
}

impl ProfileKind {
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Personal => &["name", "age", "location"],
            Self::Medical => &["diagnosis", "concern", "target"],
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Self::Personal => PERSONAL_INSTRUCTIONS,
            Self::Medical => MEDICAL_INSTRUCTIONS,
        }
    }
}

/// Extracted fields. Every field of the kind is present; unknown ones are
/// empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub kind: ProfileKind,
    pub fields: BTreeMap<String, String>,
}

impl Profile {
    fn empty(kind: ProfileKind) -> Self {
        Self {
            kind,
            fields: kind
                .fields()
                .iter()
                .map(|f| (f.to_string(), String::new()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }
}

pub struct ProfileExtractor {
    provider: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
}

impl ProfileExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn extract(&self, kind: ProfileKind, text: &str) -> Result<Profile, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let request = ProviderRequest::single_turn(&self.model, kind.instructions(), text)
            .with_temperature(0.0);
        let response = within(self.timeout, "profile extraction", self.provider.complete(request))
            .await?;

        let profile = parse_profile(kind, &response.message.content);
        debug!(kind = ?kind, fields = ?profile.fields, "Profile extracted");
        Ok(profile)
    }
}

/// Read the model's JSON object into a profile of `kind`.
fn parse_profile(kind: ProfileKind, answer: &str) -> Profile {
    let mut profile = Profile::empty(kind);

    let Some(object) = json_object(answer) else {
        warn!(kind = ?kind, "Profile answer was not a JSON object");
        return profile;
    };

    for field in kind.fields() {
        let value = match object.get(*field) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let value = if *field == "age" && !value.chars().all(|c| c.is_ascii_digit()) {
            String::new()
        } else {
            value
        };
        profile.fields.insert(field.to_string(), value);
    }

    profile
}

/// The first `{...}` span of `answer`, tolerating code fences and prose.
fn json_object(answer: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str(&answer[start..=end]) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use medassist_core::error::ProviderError;

    #[test]
    fn parses_plain_json() {
        let p = parse_profile(
            ProfileKind::Personal,
            r#"{"name": "Ana", "age": "42", "location": "Lisbon"}"#,
        );
        assert_eq!(p.get("name"), "Ana");
        assert_eq!(p.get("age"), "42");
        assert_eq!(p.get("location"), "Lisbon");
    }

    #[test]
    fn tolerates_code_fences_and_extra_keys() {
        let p = parse_profile(
            ProfileKind::Medical,
            "```json\n{\"diagnosis\": \"type 2 diabetes\", \"mood\": \"ok\"}\n```",
        );
        assert_eq!(p.get("diagnosis"), "type 2 diabetes");
        assert_eq!(p.get("concern"), "");
        assert_eq!(p.get("target"), "");
        assert_eq!(p.fields.len(), 3);
        assert!(!p.fields.contains_key("mood"));
    }

    #[test]
    fn non_numeric_age_is_blanked() {
        let p = parse_profile(ProfileKind::Personal, r#"{"age": "forty"}"#);
        assert_eq!(p.get("age"), "");
        let p = parse_profile(ProfileKind::Personal, r#"{"age": 40}"#);
        assert_eq!(p.get("age"), "40");
    }

    #[test]
    fn garbage_yields_empty_profile() {
        let p = parse_profile(ProfileKind::Personal, "I could not find anything.");
        assert_eq!(p, Profile::empty(ProfileKind::Personal));
    }

    #[tokio::test]
    async fn extract_calls_backend_with_instructions() {
        let provider = Arc::new(
            ScriptedProvider::new().reply(r#"{"name":"Sam","age":"","location":"Oslo"}"#),
        );
        let extractor = ProfileExtractor::new(provider.clone(), "mock-model");
        let p = extractor
            .extract(ProfileKind::Personal, "I'm Sam from Oslo")
            .await
            .unwrap();
        assert_eq!(p.get("name"), "Sam");
        assert_eq!(p.get("location"), "Oslo");
        assert!(provider.requests()[0].messages[0].content.contains("personal information"));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_call() {
        let provider = Arc::new(ScriptedProvider::new());
        let extractor = ProfileExtractor::new(provider.clone(), "mock-model");
        let err = extractor.extract(ProfileKind::Medical, "   ").await.unwrap_err();
        assert!(matches!(err, QueryError::EmptyQuery));
        assert_eq!(provider.complete_calls(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let provider =
            Arc::new(ScriptedProvider::new().reply_err(ProviderError::Network("down".into())));
        let extractor = ProfileExtractor::new(provider, "mock-model");
        let err = extractor.extract(ProfileKind::Medical, "I have asthma").await.unwrap_err();
        assert!(matches!(err, QueryError::Transport(_)));
    }
}
