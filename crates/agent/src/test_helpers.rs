//! Shared test helpers for orchestration tests.

use medassist_core::error::ProviderError;
use medassist_core::message::Message;
use medassist_core::provider::{
    FrameReceiver, Provider, ProviderRequest, ProviderResponse, StreamFrame, Usage, VisionRequest,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A mock provider that plays back scripted results.
///
/// Each call to `complete`, `stream` or `analyze_image` pops the next
/// scripted entry of its kind. Panics if a call has nothing scripted.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    vision: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    vision_requests: Mutex<Vec<VisionRequest>>,
    complete_calls: Mutex<usize>,
    stream_calls: Mutex<usize>,
    vision_calls: Mutex<usize>,
    /// Applied before every `complete`, `stream` and `analyze_image` result
    delay: Option<Duration>,
}

/// Frames for one `stream` call.
pub struct StreamScript {
    pub frames: Vec<Result<StreamFrame, ProviderError>>,
    /// Keep the sender alive after the frames until the receiver is dropped
    pub hold_open: bool,
    /// Set once the receiver side was observed as dropped
    pub receiver_dropped: Arc<AtomicBool>,
}

impl StreamScript {
    pub fn deltas(parts: &[&str]) -> Self {
        let mut frames: Vec<_> = parts.iter().map(|p| Ok(StreamFrame::delta(*p))).collect();
        frames.push(Ok(StreamFrame::end()));
        Self::new(frames)
    }

    pub fn new(frames: Vec<Result<StreamFrame, ProviderError>>) -> Self {
        Self {
            frames,
            hold_open: false,
            receiver_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn reply_err(self, error: ProviderError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn stream_script(self, script: StreamScript) -> Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }

    pub fn vision_reply(self, text: &str) -> Self {
        self.vision.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn vision_err(self, error: ProviderError) -> Self {
        self.vision.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn complete_calls(&self) -> usize {
        *self.complete_calls.lock().unwrap()
    }

    pub fn stream_calls(&self) -> usize {
        *self.stream_calls.lock().unwrap()
    }

    pub fn vision_calls(&self) -> usize {
        *self.vision_calls.lock().unwrap()
    }

    pub fn total_calls(&self) -> usize {
        self.complete_calls() + self.stream_calls() + self.vision_calls()
    }

    /// Every text request seen so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn vision_requests(&self) -> Vec<VisionRequest> {
        self.vision_requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        *self.complete_calls.lock().unwrap() += 1;
        self.requests.lock().unwrap().push(request);
        self.pause().await;

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(result) => result.map(|text| make_text_response(&text)),
            None => panic!("ScriptedProvider: no scripted reply for complete()"),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<FrameReceiver, ProviderError> {
        *self.stream_calls.lock().unwrap() += 1;
        self.requests.lock().unwrap().push(request);
        self.pause().await;

        let script = self.streams.lock().unwrap().pop_front();
        let Some(script) = script else {
            panic!("ScriptedProvider: no scripted stream for stream()");
        };

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            for frame in script.frames {
                if tx.send(frame).await.is_err() {
                    script.receiver_dropped.store(true, Ordering::SeqCst);
                    return;
                }
            }
            if script.hold_open {
                tx.closed().await;
                script.receiver_dropped.store(true, Ordering::SeqCst);
            }
        });
        Ok(rx)
    }

    async fn analyze_image(&self, request: VisionRequest) -> Result<String, ProviderError> {
        *self.vision_calls.lock().unwrap() += 1;
        self.vision_requests.lock().unwrap().push(request);
        self.pause().await;

        let next = self.vision.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => panic!("ScriptedProvider: no scripted reply for analyze_image()"),
        }
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}
