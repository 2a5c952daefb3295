//! Provider trait — the abstraction over language and vision model backends.
//!
//! A Provider knows how to send a prompt to a model and get a response
//! back, either as a complete message or as a stream of text deltas. Vision
//! backends additionally accept an image.
//!
//! Implementations: OpenAI-compatible endpoints (OpenAI, Perplexity, Ollama).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// Items delivered by [`Provider::stream`].
pub type FrameReceiver = mpsc::Receiver<Result<StreamFrame, ProviderError>>;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini", "sonar")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A single-turn request: one system prompt and one user message.
    pub fn single_turn(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::system(system_prompt), Message::user(user_text)],
            temperature: default_temperature(),
            max_tokens: None,
            stream: false,
            stop: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single wire-level frame of a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final frame
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final frame)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamFrame {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
            usage: None,
        }
    }

    pub fn end() -> Self {
        Self {
            content: None,
            done: true,
            usage: None,
        }
    }
}

/// A request to describe an image.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub model: String,

    /// Instructions sent as the system prompt
    pub prompt: String,

    /// Raw encoded image bytes (JPEG, PNG, ...)
    pub image: Vec<u8>,

    /// MIME type of `image`, e.g. "image/jpeg"
    pub mime_type: String,

    pub max_tokens: Option<u32>,
}

/// The core Provider trait.
///
/// Every model backend implements this trait. The orchestrator calls
/// `complete()`, `stream()` or `analyze_image()` without knowing which
/// provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "perplexity").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response frames.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single frame.
    async fn stream(&self, request: ProviderRequest) -> Result<FrameReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamFrame {
                content: Some(response.message.content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Describe an image and return the model's free text.
    ///
    /// Default implementation returns an error indicating vision isn't supported.
    async fn analyze_image(&self, _request: VisionRequest) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support image input",
            self.name()
        )))
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
