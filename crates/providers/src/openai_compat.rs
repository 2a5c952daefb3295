//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, Perplexity, Ollama, vLLM and any endpoint exposing
//! `/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Image input via `image_url` data URLs
//! - Health checks

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use medassist_core::error::ProviderError;
use medassist_core::message::Message;
use medassist_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::sse::{SseDecoder, SseEvent};

/// An OpenAI-compatible model provider.
///
/// This handles the vast majority of providers since most expose
/// an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Ask for a usage block at the end of streams (`stream_options`)
    stream_usage: bool,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// Request deadlines are enforced by the caller, so the client itself
    /// carries only a connect timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            stream_usage: true,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create a Perplexity provider (convenience constructor).
    pub fn perplexity(api_key: impl Into<String>) -> Self {
        Self::new("perplexity", "https://api.perplexity.ai", api_key).with_stream_usage(false)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Toggle the `stream_options.include_usage` request field.
    pub fn with_stream_usage(mut self, enabled: bool) -> Self {
        self.stream_usage = enabled;
        self
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream && self.stream_usage {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }

    /// Build the chat body for an image request: the prompt as system
    /// message, the image as a base64 data URL in the user message.
    fn vision_body(request: &VisionRequest) -> serde_json::Value {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&request.image);
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.prompt },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:{};base64,{}", request.mime_type, encoded)
                            }
                        }
                    ]
                }
            ],
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        accept_stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if accept_stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        self.check_status(response).await
    }

    /// Map non-success statuses to errors carrying the upstream status. The
    /// raw body is logged here and kept on `ApiError` for diagnostics.
    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        if status == 429 {
            let retry_after_secs = retry_after(response.headers());
            warn!(provider = %self.name, status, retry_after = ?retry_after_secs, "Provider rate limited request");
            return Err(ProviderError::RateLimited {
                status_code: status,
                retry_after_secs,
            });
        }

        let error_body = response.text().await.unwrap_or_default();

        if status == 401 || status == 403 {
            warn!(provider = %self.name, status, body = %error_body, "Provider rejected credentials");
            return Err(ProviderError::AuthenticationFailed {
                status_code: status,
                message: error_body,
            });
        }

        warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
        Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        })
    }

    async fn first_choice_content(
        response: reqwest::Response,
    ) -> Result<(String, Option<Usage>, String), ProviderError> {
        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let usage = api_response.usage.map(Usage::from);
        Ok((
            choice.message.content.unwrap_or_default(),
            usage,
            api_response.model,
        ))
    }
}

#[async_trait]
impl medassist_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = self.request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post(&body, false).await?;
        let (content, usage, model) = Self::first_choice_content(response).await?;

        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage,
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<FrameReceiver, ProviderError> {
        let body = self.request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and decode frames.
        // Dropping `byte_stream` (on any return) releases the connection.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut usage: Option<Usage> = None;

            loop {
                let chunk_result = tokio::select! {
                    _ = tx.closed() => {
                        trace!(provider = %provider_name, "Stream receiver dropped while waiting for upstream");
                        return;
                    }
                    next = byte_stream.next() => match next {
                        Some(chunk_result) => chunk_result,
                        None => break,
                    },
                };

                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    match handle_event(&provider_name, event, &mut usage) {
                        EventOutcome::Send(item) => {
                            if tx.send(item).await.is_err() {
                                trace!(provider = %provider_name, "Stream receiver dropped");
                                return;
                            }
                        }
                        EventOutcome::Finished => {
                            let _ = tx.send(Ok(final_frame(usage))).await;
                            return;
                        }
                        EventOutcome::Skip => {}
                    }
                }
            }

            if let Some(event) = decoder.finish() {
                if let EventOutcome::Send(item) = handle_event(&provider_name, event, &mut usage)
                {
                    let _ = tx.send(item).await;
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(final_frame(usage))).await;
        });

        Ok(rx)
    }

    async fn analyze_image(&self, request: VisionRequest) -> Result<String, ProviderError> {
        let body = Self::vision_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            bytes = request.image.len(),
            mime = %request.mime_type,
            "Sending vision request"
        );

        let response = self.post(&body, false).await?;
        let (content, _, _) = Self::first_choice_content(response).await?;
        Ok(content)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

enum EventOutcome {
    Send(Result<StreamFrame, ProviderError>),
    Finished,
    Skip,
}

/// Turn one SSE event into the item to forward, if any. Usage blocks are
/// remembered and attached to the final frame.
fn handle_event(provider: &str, event: SseEvent, usage: &mut Option<Usage>) -> EventOutcome {
    let data = match event {
        SseEvent::Done => return EventOutcome::Finished,
        SseEvent::Data(data) => data,
    };

    match serde_json::from_str::<StreamResponse>(&data) {
        Ok(stream_resp) => {
            if let Some(u) = stream_resp.usage {
                *usage = Some(u.into());
            }
            let content = stream_resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty());
            match content {
                Some(text) => EventOutcome::Send(Ok(StreamFrame::delta(text))),
                None => EventOutcome::Skip,
            }
        }
        Err(e) => {
            trace!(provider = %provider, data = %data, error = %e, "Unparseable SSE chunk");
            EventOutcome::Send(Err(ProviderError::MalformedFrame(e.to_string())))
        }
    }
}

/// `Retry-After` in delay-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn final_frame(usage: Option<Usage>) -> StreamFrame {
    StreamFrame {
        content: None,
        done: true,
        usage,
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
