//! # MedAssist Core
//!
//! Domain types, traits, and error definitions for the MedAssist dialogue
//! orchestrator. This crate has **no HTTP or model dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external backend is reached through the [`Provider`] trait defined
//! here. Implementations live in `medassist-providers`. This enables:
//! - Swapping backends via configuration
//! - Easy testing with scripted mock providers
//! - Clean dependency graph (all crates depend inward on core)

pub mod classification;
pub mod error;
pub mod history;
pub mod message;
pub mod nutrition;
pub mod persona;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use classification::{QueryCategory, QueryClassification};
pub use error::{ErrorKind, ErrorRecord, ProviderError, QueryError};
pub use history::{DEFAULT_MAX_HISTORY, Exchange, HistoryRing};
pub use message::{Message, Role};
pub use nutrition::{NutritionAnalysis, NutritionCategory, ParseDiagnostic};
pub use persona::{PersonaConfig, PersonaId, ScopeValidation};
pub use provider::{
    FrameReceiver, Provider, ProviderRequest, ProviderResponse, StreamFrame, Usage, VisionRequest,
};
