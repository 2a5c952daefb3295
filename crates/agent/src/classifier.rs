//! Query classifier.
//!
//! A local greeting lexicon is consulted first; anything else goes to a
//! single-turn labelling call on the classification backend. Output that
//! does not name exactly one label fails closed to `Unrelated`.

use std::sync::Arc;
use std::time::Duration;

use medassist_core::classification::{QueryCategory, QueryClassification};
use medassist_core::error::{ErrorKind, ProviderError};
use medassist_core::provider::{Provider, ProviderRequest};
use tracing::{debug, warn};

use crate::timeouts::within;

pub const CLASSIFIER_PROMPT: &str = "You label messages sent to a medical information assistant. \
Reply with exactly one word and nothing else:\n\
GREETING if the message is only a greeting, a farewell or a thank-you;\n\
DOMAIN if it asks about health, medicine, medications, symptoms, nutrition or the body;\n\
UNRELATED for anything else.";

const GREETINGS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
    "howdy",
    "hiya",
    "yo",
];

const FAREWELLS: &[&str] = &[
    "bye",
    "goodbye",
    "good bye",
    "see you",
    "see ya",
    "farewell",
    "good night",
];

const THANKS: &[&str] = &["thanks", "thank you", "thanks a lot", "cheers"];

/// Which part of the lexicon a greeting matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingKind {
    Hello,
    Farewell,
    Thanks,
}

/// Lower-case, strip trailing punctuation and collapse whitespace.
fn normalize(query: &str) -> String {
    query
        .trim()
        .trim_end_matches(|c: char| "!?.,;:".contains(c) || c.is_whitespace())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Match `query` against the fixed greeting lexicon.
pub fn greeting_kind(query: &str) -> Option<GreetingKind> {
    let normalized = normalize(query);
    let normalized = normalized.as_str();
    if GREETINGS.contains(&normalized) {
        Some(GreetingKind::Hello)
    } else if FAREWELLS.contains(&normalized) {
        Some(GreetingKind::Farewell)
    } else if THANKS.contains(&normalized) {
        Some(GreetingKind::Thanks)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Greeting,
    Domain,
    Unrelated,
}

/// Upper-cased word tokens of a model answer.
fn tokens(answer: &str) -> impl Iterator<Item = String> + '_ {
    answer
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_uppercase())
}

/// Tokens that flip the meaning of a label ("NOT DOMAIN", "isn't ...").
const NEGATIONS: &[&str] = &["NOT", "NO", "NON", "ISN", "ISNT", "NEITHER", "NOR", "NEVER"];

/// The single label named in `answer`, if exactly one distinct label occurs
/// and nothing negates it.
fn parse_label(answer: &str) -> Option<Label> {
    let mut found: Option<Label> = None;
    for token in tokens(answer) {
        if NEGATIONS.contains(&token.as_str()) {
            return None;
        }
        let label = match token.as_str() {
            "GREETING" => Label::Greeting,
            "DOMAIN" => Label::Domain,
            "UNRELATED" => Label::Unrelated,
            _ => continue,
        };
        match found {
            Some(existing) if existing != label => return None,
            _ => found = Some(label),
        }
    }
    found
}

/// `true` only for an unambiguous YES.
fn parse_yes_no(answer: &str) -> bool {
    let mut yes = false;
    for token in tokens(answer) {
        match token.as_str() {
            "YES" => yes = true,
            "NO" => return false,
            _ => {}
        }
    }
    yes
}

/// Labels queries and runs binary relevance checks.
pub struct Classifier {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl Classifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 10,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify a non-empty query.
    pub async fn classify(&self, query: &str) -> Result<QueryClassification, ProviderError> {
        if greeting_kind(query).is_some() {
            debug!("Greeting matched locally");
            return Ok(QueryClassification::Greeting);
        }

        let answer = self.ask_model(CLASSIFIER_PROMPT, query).await?;
        let classification = match parse_label(&answer) {
            Some(Label::Greeting) => QueryClassification::Greeting,
            Some(Label::Domain) => {
                QueryClassification::DomainRelevant(QueryCategory::from_query(query))
            }
            Some(Label::Unrelated) => QueryClassification::Unrelated,
            None => {
                warn!(
                    kind = ?ErrorKind::ClassificationAmbiguous,
                    answer = %answer,
                    "Ambiguous classifier output, treating query as unrelated"
                );
                QueryClassification::Unrelated
            }
        };

        debug!(classification = ?classification, "Query classified");
        Ok(classification)
    }

    /// Binary relevance check with `instruction` as the system prompt.
    /// Anything other than a clear YES is a rejection.
    pub async fn check_relevance(
        &self,
        instruction: &str,
        query: &str,
    ) -> Result<bool, ProviderError> {
        let answer = self.ask_model(instruction, query).await?;
        let relevant = parse_yes_no(&answer);
        debug!(relevant, answer = %answer, "Relevance check");
        Ok(relevant)
    }

    async fn ask_model(&self, system: &str, query: &str) -> Result<String, ProviderError> {
        let request = ProviderRequest::single_turn(&self.model, system, query)
            .with_temperature(0.0)
            .with_max_tokens(self.max_tokens);

        let response = within(self.timeout, "classification", self.provider.complete(request)).await?;
        Ok(response.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;

    #[test]
    fn greeting_is_case_and_punctuation_insensitive() {
        for q in ["Hello!", "hello", "  HELLO ", "hello?!", "Good   Morning.", "hey,"] {
            assert_eq!(greeting_kind(q), Some(GreetingKind::Hello), "{q}");
        }
        assert_eq!(greeting_kind("Hello!"), greeting_kind("hello"));
    }

    #[test]
    fn farewell_and_thanks_are_distinguished() {
        assert_eq!(greeting_kind("Goodbye!"), Some(GreetingKind::Farewell));
        assert_eq!(greeting_kind("see you."), Some(GreetingKind::Farewell));
        assert_eq!(greeting_kind("Thank you!"), Some(GreetingKind::Thanks));
        assert_eq!(greeting_kind("thanks a lot"), Some(GreetingKind::Thanks));
    }

    #[test]
    fn greeting_with_question_is_not_lexical_greeting() {
        assert_eq!(greeting_kind("hi, what is ozempic?"), None);
        assert_eq!(greeting_kind("history"), None);
    }

    #[test]
    fn label_parsing_requires_exactly_one_label() {
        assert_eq!(parse_label("DOMAIN"), Some(Label::Domain));
        assert_eq!(parse_label(" domain.\n"), Some(Label::Domain));
        assert_eq!(parse_label("Label: UNRELATED"), Some(Label::Unrelated));
        assert_eq!(parse_label("DOMAIN DOMAIN"), Some(Label::Domain));
        assert_eq!(parse_label("DOMAIN or UNRELATED"), None);
        assert_eq!(parse_label("medical"), None);
    }

    #[test]
    fn negated_label_is_ambiguous() {
        assert_eq!(parse_label("NOT DOMAIN"), None);
        assert_eq!(parse_label("not a domain question"), None);
        assert_eq!(parse_label("This isn't DOMAIN"), None);
        assert_eq!(parse_label("Non-domain: UNRELATED"), None);
        assert_eq!(parse_label("DOMAIN, not GREETING"), None);
        assert_eq!(parse_label(""), None);
    }

    #[test]
    fn yes_no_fails_closed() {
        assert!(parse_yes_no("YES"));
        assert!(parse_yes_no("yes."));
        assert!(!parse_yes_no("NO"));
        assert!(!parse_yes_no("yes and no"));
        assert!(!parse_yes_no("maybe"));
        assert!(!parse_yes_no(""));
    }

    #[tokio::test]
    async fn local_greeting_does_not_call_backend() {
        let provider = Arc::new(ScriptedProvider::new());
        let classifier = Classifier::new(provider.clone(), "mock-model");
        let c = classifier.classify("Hi!").await.unwrap();
        assert_eq!(c, QueryClassification::Greeting);
        assert_eq!(provider.complete_calls(), 0);
    }

    #[tokio::test]
    async fn domain_label_carries_category() {
        let provider = Arc::new(ScriptedProvider::new().reply("DOMAIN"));
        let classifier = Classifier::new(provider.clone(), "mock-model");
        let c = classifier
            .classify("What dose of semaglutide should I start with?")
            .await
            .unwrap();
        assert_eq!(c, QueryClassification::DomainRelevant(QueryCategory::Dosage));

        let request = &provider.requests()[0];
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, Some(10));
        assert_eq!(request.messages[0].content, CLASSIFIER_PROMPT);
    }

    #[tokio::test]
    async fn ambiguous_answer_is_unrelated() {
        let provider = Arc::new(ScriptedProvider::new().reply("Probably DOMAIN, maybe GREETING"));
        let classifier = Classifier::new(provider, "mock-model");
        let c = classifier.classify("tell me stuff").await.unwrap();
        assert_eq!(c, QueryClassification::Unrelated);
    }

    #[tokio::test]
    async fn negated_domain_answer_fails_closed() {
        let provider = Arc::new(ScriptedProvider::new().reply("NOT DOMAIN"));
        let classifier = Classifier::new(provider, "mock-model");
        let c = classifier.classify("How do I fix my bike chain?").await.unwrap();
        assert_eq!(c, QueryClassification::Unrelated);
    }

    #[tokio::test]
    async fn transport_error_is_returned() {
        let provider = Arc::new(ScriptedProvider::new().reply_err(ProviderError::ApiError {
            status_code: 500,
            message: "boom".into(),
        }));
        let classifier = Classifier::new(provider, "mock-model");
        let err = classifier.classify("what is insulin").await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 500, .. }));
    }

    #[tokio::test]
    async fn relevance_check_uses_instruction() {
        let provider = Arc::new(ScriptedProvider::new().reply("YES").reply("No."));
        let classifier = Classifier::new(provider.clone(), "mock-model");
        assert!(classifier.check_relevance("Is it medical?", "fever").await.unwrap());
        assert!(!classifier.check_relevance("Is it medical?", "football").await.unwrap());
        assert_eq!(provider.requests()[0].messages[0].content, "Is it medical?");
    }
}
