//! Provider trait - the uniform call interface to any LLM backend.
//!
//! Implementations wrap a specific backend and handle the specifics of the
//! wire protocol. Retry policy lives in the pass controller, never here.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::result::TokenUsage;

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            max_tokens: 4096,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// The raw outcome of a completion call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Uniform call interface to an LLM backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier for accounting and vote bookkeeping.
    fn id(&self) -> &str;

    /// Issue one completion call. No retries inside the provider.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Backend-specific, pure cost model in USD.
    fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64;
}

/// Embedding generation, used by the chunker's similarity signal and the
/// hallucination detector's semantic-consistency check.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch variant; default implementation is sequential.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
