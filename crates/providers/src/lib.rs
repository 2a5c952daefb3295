//! LLM provider implementations for MedAssist.
//!
//! All providers implement the `medassist_core::Provider` trait.
//! The router builds one instance per configured provider name.

pub mod openai_compat;
pub mod router;
pub mod sse;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config, default_base_url};
