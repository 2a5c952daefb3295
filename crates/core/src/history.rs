//! History Ring — a bounded FIFO log of past exchanges.
//!
//! Appends go to the tail; once `capacity` is exceeded the oldest entry is
//! evicted from the head. Entries are never mutated after append.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persona::PersonaId;

/// Default number of exchanges kept.
pub const DEFAULT_MAX_HISTORY: usize = 5;

/// One query/response turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    query: String,
    response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    persona: Option<PersonaId>,
    timestamp: DateTime<Utc>,
}

impl Exchange {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        persona: Option<PersonaId>,
    ) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            persona,
            timestamp: Utc::now(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn persona(&self) -> Option<PersonaId> {
        self.persona
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<Exchange>,
    capacity: usize,
}

impl HistoryRing {
    /// Create an empty ring. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an exchange, evicting the oldest when full. Returns the evicted entry.
    pub fn push(&mut self, exchange: Exchange) -> Option<Exchange> {
        self.entries.push_back(exchange);
        if self.entries.len() > self.capacity {
            let evicted = self.entries.pop_front();
            tracing::trace!(capacity = self.capacity, "History full, evicted oldest exchange");
            evicted
        } else {
            None
        }
    }

    /// A snapshot of the current entries, oldest first.
    pub fn list(&self) -> Vec<Exchange> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}
