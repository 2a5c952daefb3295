//! Dialogue orchestration for MedAssist.
//!
//! Each query follows a fixed protocol:
//!
//! 1. **Reject** empty input
//! 2. **Classify** as greeting, domain-relevant or unrelated
//! 3. **Short-circuit** greetings and unrelated queries with a fixed reply
//! 4. **Validate** domain queries against the persona's scope, if it has a check
//! 5. **Answer** via the answering backend, blocking or streamed
//! 6. **Aggregate** the answer and append the exchange to history
//!
//! Image queries skip classification and go straight to the vision backend,
//! whose free-text answer is parsed into a `NutritionAnalysis`.

pub mod aggregator;
pub mod classifier;
pub mod orchestrator;
pub mod parser;
pub mod persona;
pub mod profile;
pub mod state;
pub mod stream_event;
pub mod timeouts;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use aggregator::{AggregationContext, ChunkStream, ResponseAggregator};
pub use classifier::{Classifier, GreetingKind};
pub use orchestrator::{
    Collaborators, DISCLAIMER, ImageAnalysisResponse, ModelParams, Orchestrator, QueryAnswer,
    QueryResponse,
};
pub use persona::PersonaRegistry;
pub use profile::{Profile, ProfileExtractor, ProfileKind};
pub use state::{QueryState, QueryTracker};
pub use stream_event::{CompletionMetadata, Route, StreamChunk};
pub use timeouts::Timeouts;
