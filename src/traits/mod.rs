//! Core trait abstractions.

pub mod provider;
pub mod quota;

pub use provider::{CompletionRequest, CompletionResponse, Embedder, Provider};
pub use quota::QuotaGate;
