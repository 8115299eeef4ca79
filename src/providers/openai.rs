//! OpenAI-compatible provider (chat completions + embeddings).
//!
//! The reference backend. A custom base URL makes it work against Azure,
//! OpenRouter or any compatible proxy.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, Result};
use crate::security::SecretString;
use crate::traits::provider::{CompletionRequest, CompletionResponse, Embedder, Provider};
use crate::types::result::TokenUsage;

/// Per-million-token pricing for a chat model.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    /// Lookup for known models; unknown models cost nothing rather than
    /// guessing, so accounting stays conservative.
    pub fn for_model(model: &str) -> Self {
        match model {
            "gpt-4o" => Pricing {
                input_per_million: 2.50,
                output_per_million: 10.00,
            },
            "gpt-4o-mini" => Pricing {
                input_per_million: 0.15,
                output_per_million: 0.60,
            },
            _ => Pricing {
                input_per_million: 0.0,
                output_per_million: 0.0,
            },
        }
    }
}

/// OpenAI-compatible backend.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
    id: String,
    model: String,
    embedding_model: String,
    base_url: String,
    pricing: Pricing,
}

impl OpenAiProvider {
    pub fn new(id: impl Into<String>, api_key: impl Into<SecretString>, model: impl Into<String>) -> Self {
        let model = model.into();
        let pricing = Pricing::for_model(&model);
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            id: id.into(),
            model,
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            pricing,
        }
    }

    /// Set a custom base URL (Azure, proxies, OpenRouter).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the embedding model (default: text-embedding-3-small).
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Override the pricing table (for proxies with different rates).
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ExtractionError::provider)?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::provider_msg(format!(
                "chat completion error: {error_text}"
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(ExtractionError::provider)?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::provider_msg("empty choices in chat response"))?;

        Ok(CompletionResponse { content, usage })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.chat(request).await
    }

    fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.pricing.input_per_million
            + output_tokens as f64 * self.pricing.output_per_million)
            / 1_000_000.0
    }
}

#[async_trait]
impl Embedder for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractionError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Embedding(error_text));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Embedding(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ExtractionError::Embedding("empty embedding response".into()))
    }
}

// Wire types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let p = OpenAiProvider::new("t1", "sk-test", "gpt-4o-mini")
            .with_base_url("https://proxy.local/v1")
            .with_embedding_model("text-embedding-3-large");

        assert_eq!(p.id(), "t1");
        assert_eq!(p.model(), "gpt-4o-mini");
        assert_eq!(p.base_url, "https://proxy.local/v1");
    }

    #[test]
    fn test_cost_is_pure_and_linear() {
        let p = OpenAiProvider::new("t1", "sk", "gpt-4o-mini");
        let one = p.calculate_cost(1_000_000, 0);
        assert!((one - 0.15).abs() < 1e-9);
        assert!((p.calculate_cost(2_000_000, 0) - 2.0 * one).abs() < 1e-9);

        // Unknown models cost zero rather than a guess
        let unknown = OpenAiProvider::new("x", "sk", "some-local-model");
        assert_eq!(unknown.calculate_cost(1_000_000, 1_000_000), 0.0);
    }
}
