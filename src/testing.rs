//! Shared test doubles.
//!
//! `MockProvider` replays scripted responses and records every request it
//! receives; clones share state, so a handle kept aside still sees calls
//! made through the engine. Compiled into the library so integration tests
//! can drive the full pipeline without a network.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{ExtractionError, Result};
use crate::traits::provider::{CompletionRequest, CompletionResponse, Embedder, Provider};
use crate::types::result::TokenUsage;

#[derive(Default)]
struct MockProviderState {
    /// Scripted responses, consumed front-to-back; the last one repeats
    /// once the queue is exhausted
    responses: VecDeque<String>,
    last_response: Option<String>,
    calls: Vec<CompletionRequest>,
}

/// A scripted `Provider` with call recording.
#[derive(Clone)]
pub struct MockProvider {
    id: String,
    state: Arc<Mutex<MockProviderState>>,
    usage: TokenUsage,
    cost_per_call: f64,
    delay_ms: u64,
    failure: Option<String>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(Mutex::new(MockProviderState::default())),
            usage: TokenUsage::default(),
            cost_per_call: 0.0,
            delay_ms: 0,
            failure: None,
        }
    }

    /// Queue one response. Call repeatedly to script a sequence.
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.state
            .lock()
            .expect("mock state lock")
            .responses
            .push_back(response.into());
        self
    }

    pub fn with_responses(self, responses: Vec<String>) -> Self {
        self.state
            .lock()
            .expect("mock state lock")
            .responses
            .extend(responses);
        self
    }

    /// Token usage reported on every response.
    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.usage = TokenUsage::new(input, output);
        self
    }

    pub fn with_cost_per_call(mut self, cost_usd: f64) -> Self {
        self.cost_per_call = cost_usd;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Every call fails with the given message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.state.lock().expect("mock state lock").calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().expect("mock state lock").calls.len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        let content = {
            let mut state = self.state.lock().expect("mock state lock");
            state.calls.push(request.clone());

            if let Some(message) = &self.failure {
                return Err(ExtractionError::provider_msg(message.clone()));
            }

            match state.responses.pop_front() {
                Some(response) => {
                    state.last_response = Some(response.clone());
                    response
                }
                None => state
                    .last_response
                    .clone()
                    .unwrap_or_else(|| r#"{"items":[]}"#.to_string()),
            }
        };

        Ok(CompletionResponse {
            content,
            usage: self.usage,
        })
    }

    fn calculate_cost(&self, _input_tokens: u64, _output_tokens: u64) -> f64 {
        self.cost_per_call
    }
}

const MOCK_EMBEDDING_DIM: usize = 32;

/// A deterministic `Embedder`. The default hashes the text, so equal texts
/// get equal vectors; `orthogonal()` instead assigns each distinct text its
/// own basis vector, making every cross-text similarity zero.
pub struct MockEmbedder {
    orthogonal: bool,
    assigned: Mutex<HashMap<String, usize>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            orthogonal: false,
            assigned: Mutex::new(HashMap::new()),
        }
    }

    pub fn orthogonal() -> Self {
        Self {
            orthogonal: true,
            assigned: Mutex::new(HashMap::new()),
        }
    }

    fn hash_vector(text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        digest
            .iter()
            .cycle()
            .take(MOCK_EMBEDDING_DIM)
            .map(|b| (*b as f32 - 127.5) / 127.5)
            .collect()
    }

    fn basis_vector(&self, text: &str) -> Vec<f32> {
        let mut assigned = self.assigned.lock().expect("mock embedder lock");
        let next = assigned.len();
        let index = *assigned.entry(text.to_string()).or_insert(next);

        let mut v = vec![0.0f32; MOCK_EMBEDDING_DIM];
        v[index % MOCK_EMBEDDING_DIM] = 1.0;
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(if self.orthogonal {
            self.basis_vector(text)
        } else {
            Self::hash_vector(text)
        })
    }
}
