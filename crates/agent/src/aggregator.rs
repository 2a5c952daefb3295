//! Response Aggregator.
//!
//! Turns either a single blocking call or a receiver of wire frames into a
//! lazy, pull-driven `ChunkStream`. Deltas are forwarded as `Partial`
//! chunks in arrival order and concatenated; the stream ends with one
//! `Complete` (after the exchange is appended to history) or one `Failed`.
//!
//! Dropping the stream before its terminal chunk drops the frame receiver,
//! which stops the provider's reader task. Nothing is appended in that case.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Stream, stream};
use medassist_core::error::{ErrorKind, ErrorRecord, ProviderError};
use medassist_core::history::{Exchange, HistoryRing};
use medassist_core::provider::{FrameReceiver, ProviderResponse, StreamFrame, Usage};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::state::{QueryState, QueryTracker};
use crate::stream_event::{CompletionMetadata, StreamChunk};

/// A finite, non-restartable sequence of chunks for one request.
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// What the aggregator needs to know about the request it serves.
#[derive(Debug, Clone)]
pub struct AggregationContext {
    /// The user's query as it should appear in history
    pub query: String,
    /// Template for the `Complete` chunk's metadata
    pub metadata: CompletionMetadata,
    pub tracker: QueryTracker,
}

pub struct ResponseAggregator {
    history: Arc<Mutex<HistoryRing>>,
    context: AggregationContext,
    frame_timeout: Option<Duration>,
}

impl ResponseAggregator {
    pub fn new(history: Arc<Mutex<HistoryRing>>, context: AggregationContext) -> Self {
        Self {
            history,
            context,
            frame_timeout: None,
        }
    }

    /// Fail the stream when no frame arrives within `timeout`.
    pub fn with_frame_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Aggregate a non-streamed call: exactly one terminal chunk.
    pub fn from_call<F>(self, call: F) -> ChunkStream
    where
        F: Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'static,
    {
        let mut aggregator = self;
        Box::pin(stream::once(async move {
            let result = call.await;
            aggregator.context.tracker.advance(QueryState::Aggregating);
            match result {
                Ok(response) => {
                    let model = Some(response.model).filter(|m| !m.is_empty());
                    aggregator
                        .complete(response.message.content, model, response.usage)
                        .await
                }
                Err(e) => aggregator.fail(e),
            }
        }))
    }

    /// Aggregate a streamed call.
    pub fn from_frames(self, frames: FrameReceiver) -> ChunkStream {
        let mut aggregator = self;
        aggregator.context.tracker.advance(QueryState::Aggregating);

        let state = FrameState {
            aggregator,
            frames: Some(frames),
            buffer: String::new(),
            usage: None,
            phase: Phase::Streaming,
        };

        Box::pin(stream::unfold(state, |mut st| async move {
            match st.phase {
                Phase::Finished => return None,
                Phase::Closing => {
                    st.phase = Phase::Finished;
                    let chunk = st.finish().await;
                    return Some((chunk, st));
                }
                Phase::Streaming => {}
            }

            loop {
                match st.next_item().await {
                    Some(Ok(frame)) => {
                        if frame.usage.is_some() {
                            st.usage = frame.usage;
                        }
                        let delta = frame.content.filter(|c| !c.is_empty());

                        if frame.done {
                            st.frames = None;
                            return match delta {
                                Some(content) => {
                                    st.buffer.push_str(&content);
                                    st.phase = Phase::Closing;
                                    Some((StreamChunk::Partial { content }, st))
                                }
                                None => {
                                    st.phase = Phase::Finished;
                                    let chunk = st.finish().await;
                                    Some((chunk, st))
                                }
                            };
                        }

                        if let Some(content) = delta {
                            st.buffer.push_str(&content);
                            return Some((StreamChunk::Partial { content }, st));
                        }
                    }
                    Some(Err(e)) if e.is_frame_local() => {
                        warn!(
                            request_id = %st.aggregator.context.tracker.request_id(),
                            kind = ?ErrorKind::MalformedFrame,
                            error = %e,
                            "Skipping malformed frame"
                        );
                    }
                    Some(Err(e)) => {
                        st.frames = None;
                        st.phase = Phase::Finished;
                        let chunk = st.aggregator.fail(e);
                        return Some((chunk, st));
                    }
                    None => {
                        st.frames = None;
                        st.phase = Phase::Finished;
                        let chunk = st.finish().await;
                        return Some((chunk, st));
                    }
                }
            }
        }))
    }

    /// Append the exchange and build the `Complete` chunk.
    async fn complete(
        &mut self,
        content: String,
        model: Option<String>,
        usage: Option<Usage>,
    ) -> StreamChunk {
        let exchange = Exchange::new(
            self.context.query.clone(),
            content.clone(),
            Some(self.context.metadata.persona),
        );
        {
            let mut history = self.history.lock().await;
            history.push(exchange);
            debug!(
                request_id = %self.context.tracker.request_id(),
                entries = history.len(),
                "History updated"
            );
        }
        self.context.tracker.advance(QueryState::HistoryUpdated);

        let mut metadata = self.context.metadata.clone();
        if model.is_some() {
            metadata.model = model;
        }
        metadata.usage = usage;
        metadata.timestamp = Utc::now();

        self.context.tracker.advance(QueryState::Done);
        StreamChunk::Complete { content, metadata }
    }

    fn fail(&mut self, error: ProviderError) -> StreamChunk {
        warn!(
            request_id = %self.context.tracker.request_id(),
            error = %error,
            "Answer failed"
        );
        self.context.tracker.advance(QueryState::Failed);
        StreamChunk::Failed {
            error: ErrorRecord::from(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    /// The last delta was emitted; `Complete` is next.
    Closing,
    Finished,
}

struct FrameState {
    aggregator: ResponseAggregator,
    frames: Option<FrameReceiver>,
    buffer: String,
    usage: Option<Usage>,
    phase: Phase,
}

impl FrameState {
    async fn next_item(&mut self) -> Option<Result<StreamFrame, ProviderError>> {
        let frames = self.frames.as_mut()?;
        match self.aggregator.frame_timeout {
            Some(limit) => match tokio::time::timeout(limit, frames.recv()).await {
                Ok(item) => item,
                Err(_) => Some(Err(ProviderError::Timeout(format!(
                    "no frame received within {limit:?}"
                )))),
            },
            None => frames.recv().await,
        }
    }

    async fn finish(&mut self) -> StreamChunk {
        let content = std::mem::take(&mut self.buffer);
        let usage = self.usage.take();
        self.aggregator.complete(content, None, usage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::Route;
    use futures::StreamExt;
    use medassist_core::message::Message;
    use medassist_core::persona::PersonaId;
    use tokio::sync::mpsc;

    fn aggregator(history: &Arc<Mutex<HistoryRing>>) -> ResponseAggregator {
        ResponseAggregator::new(
            history.clone(),
            AggregationContext {
                query: "What is X?".into(),
                metadata: CompletionMetadata::new("req-test", Route::Answered, PersonaId::Glp1),
                tracker: QueryTracker::new("req-test"),
            },
        )
    }

    fn shared_history() -> Arc<Mutex<HistoryRing>> {
        Arc::new(Mutex::new(HistoryRing::default()))
    }

    async fn frames_from(
        items: Vec<Result<StreamFrame, ProviderError>>,
    ) -> FrameReceiver {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.send(item).await.unwrap();
        }
        rx
    }

    fn partial(text: &str) -> StreamChunk {
        StreamChunk::Partial {
            content: text.into(),
        }
    }

    #[tokio::test]
    async fn partials_then_complete_with_concatenation() {
        let history = shared_history();
        let rx = frames_from(vec![
            Ok(StreamFrame::delta("The ")),
            Ok(StreamFrame::delta("answer ")),
            Ok(StreamFrame::delta("is X.")),
            Ok(StreamFrame::end()),
        ])
        .await;

        let chunks: Vec<StreamChunk> = aggregator(&history).from_frames(rx).collect().await;

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], partial("The "));
        assert_eq!(chunks[1], partial("answer "));
        assert_eq!(chunks[2], partial("is X."));
        match &chunks[3] {
            StreamChunk::Complete { content, metadata } => {
                assert_eq!(content, "The answer is X.");
                assert_eq!(metadata.route, Route::Answered);
            }
            other => panic!("expected Complete, got {other:?}"),
        }

        let history = history.lock().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history.list()[0].response(), "The answer is X.");
        assert_eq!(history.list()[0].query(), "What is X?");
    }

    #[tokio::test]
    async fn channel_close_counts_as_clean_end() {
        let history = shared_history();
        let rx = frames_from(vec![Ok(StreamFrame::delta("a")), Ok(StreamFrame::delta("b"))]).await;
        let chunks: Vec<StreamChunk> = aggregator(&history).from_frames(rx).collect().await;
        assert_eq!(chunks.len(), 3);
        assert!(matches!(&chunks[2], StreamChunk::Complete { content, .. } if content == "ab"));
    }

    #[tokio::test]
    async fn transport_failure_after_two_partials() {
        let history = shared_history();
        let rx = frames_from(vec![
            Ok(StreamFrame::delta("The ")),
            Ok(StreamFrame::delta("answer ")),
            Err(ProviderError::StreamInterrupted("connection reset".into())),
            Ok(StreamFrame::delta("never seen")),
        ])
        .await;

        let chunks: Vec<StreamChunk> = aggregator(&history).from_frames(rx).collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], partial("The "));
        assert_eq!(chunks[1], partial("answer "));
        match &chunks[2] {
            StreamChunk::Failed { error } => assert_eq!(error.kind, ErrorKind::TransportFailure),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let history = shared_history();
        let rx = frames_from(vec![
            Ok(StreamFrame::delta("one ")),
            Err(ProviderError::MalformedFrame("bad json".into())),
            Ok(StreamFrame::delta("two")),
            Ok(StreamFrame::end()),
        ])
        .await;

        let chunks: Vec<StreamChunk> = aggregator(&history).from_frames(rx).collect().await;
        assert_eq!(chunks.len(), 3);
        assert!(matches!(&chunks[2], StreamChunk::Complete { content, .. } if content == "one two"));
    }

    #[tokio::test]
    async fn empty_deltas_are_not_forwarded() {
        let history = shared_history();
        let rx = frames_from(vec![
            Ok(StreamFrame::delta("")),
            Ok(StreamFrame {
                content: None,
                done: false,
                usage: None,
            }),
            Ok(StreamFrame::delta("x")),
            Ok(StreamFrame::end()),
        ])
        .await;
        let chunks: Vec<StreamChunk> = aggregator(&history).from_frames(rx).collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], partial("x"));
    }

    #[tokio::test]
    async fn final_frame_delta_precedes_complete() {
        let history = shared_history();
        let usage = Usage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        };
        let rx = frames_from(vec![
            Ok(StreamFrame::delta("Hi ")),
            Ok(StreamFrame {
                content: Some("there".into()),
                done: true,
                usage: Some(usage),
            }),
        ])
        .await;

        let chunks: Vec<StreamChunk> = aggregator(&history).from_frames(rx).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], partial("there"));
        match &chunks[2] {
            StreamChunk::Complete { content, metadata } => {
                assert_eq!(content, "Hi there");
                assert_eq!(metadata.usage, Some(usage));
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nothing_follows_terminal_chunk() {
        let history = shared_history();
        let rx = frames_from(vec![Ok(StreamFrame::end())]).await;
        let mut stream = aggregator(&history).from_frames(rx);
        assert!(stream.next().await.unwrap().is_terminal());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_stream_appends_nothing_and_closes_receiver() {
        let history = shared_history();
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(StreamFrame::delta("partial "))).await.unwrap();

        let mut stream = aggregator(&history).from_frames(rx);
        assert_eq!(stream.next().await.unwrap(), partial("partial "));
        drop(stream);

        assert!(tx.is_closed());
        assert!(tx.send(Ok(StreamFrame::delta("more"))).await.is_err());
        assert!(history.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let history = shared_history();
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(StreamFrame::delta("slow"))).await.unwrap();

        let chunks: Vec<StreamChunk> = aggregator(&history)
            .with_frame_timeout(Some(Duration::from_millis(100)))
            .from_frames(rx)
            .collect()
            .await;

        assert_eq!(chunks.len(), 2);
        match &chunks[1] {
            StreamChunk::Failed { error } => {
                assert_eq!(error.kind, ErrorKind::TransportFailure);
                assert!(error.message.contains("timed out"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(history.lock().await.is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn blocking_call_yields_single_complete() {
        let history = shared_history();
        let call = async {
            Ok(ProviderResponse {
                message: Message::assistant("Done."),
                usage: None,
                model: "sonar".into(),
            })
        };
        let chunks: Vec<StreamChunk> = aggregator(&history).from_call(call).collect().await;
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            StreamChunk::Complete { content, metadata } => {
                assert_eq!(content, "Done.");
                assert_eq!(metadata.model.as_deref(), Some("sonar"));
            }
            other => panic!("expected Complete, got {other:?}"),
        }
        assert_eq!(history.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn blocking_call_failure_yields_single_failed() {
        let history = shared_history();
        let call = async {
            Err(ProviderError::ApiError {
                status_code: 503,
                message: "upstream body".into(),
            })
        };
        let chunks: Vec<StreamChunk> = aggregator(&history).from_call(call).collect().await;
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            StreamChunk::Failed { error } => {
                assert!(error.message.contains("503"));
                assert!(!error.message.contains("upstream body"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(history.lock().await.is_empty());
    }
}
