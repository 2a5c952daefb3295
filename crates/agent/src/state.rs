//! Per-query state machine bookkeeping.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The stages a single query passes through.
///
/// `Received → Classified → (Greeting | Unrelated | DomainValidating) →
/// Answering → Aggregating → HistoryUpdated → Done`, with `Failed`
/// reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Received,
    Classified,
    Greeting,
    Unrelated,
    DomainValidating,
    Answering,
    Aggregating,
    HistoryUpdated,
    Done,
    Failed,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Tracks and logs the state of one request.
#[derive(Debug, Clone)]
pub struct QueryTracker {
    request_id: String,
    state: QueryState,
}

impl QueryTracker {
    pub fn new(request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        debug!(request_id = %request_id, state = ?QueryState::Received, "Query received");
        Self {
            request_id,
            state: QueryState::Received,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Move to `next`. A terminal state is final; later transitions are
    /// logged and ignored.
    pub fn advance(&mut self, next: QueryState) {
        if self.state.is_terminal() {
            warn!(
                request_id = %self.request_id,
                state = ?self.state,
                ignored = ?next,
                "Transition after terminal state"
            );
            return;
        }
        debug!(
            request_id = %self.request_id,
            from = ?self.state,
            to = ?next,
            "Query state transition"
        );
        self.state = next;
    }
}
