//! Timed, failure-absorbing provider calls.
//!
//! A timed-out or failed call becomes an error-shaped `CallOutput`, never
//! an `Err` - per-call failures contribute zero items and must not abort
//! the batch.

use std::time::{Duration, Instant};
use tracing::warn;

use crate::traits::provider::{CompletionRequest, Provider};
use crate::types::result::TokenUsage;

/// The absorbed outcome of one provider call.
#[derive(Debug, Clone)]
pub struct CallOutput {
    /// Response text; `None` when the call failed or timed out
    pub content: Option<String>,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl CallOutput {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Issue one completion call with a timeout, absorbing failures.
pub async fn timed_call(
    provider: &dyn Provider,
    request: &CompletionRequest,
    timeout: Duration,
) -> CallOutput {
    let started = Instant::now();

    let outcome = tokio::time::timeout(timeout, provider.complete(request)).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(response)) => {
            let cost_usd = provider.calculate_cost(response.usage.input, response.usage.output);
            CallOutput {
                content: Some(response.content),
                usage: response.usage,
                cost_usd,
                latency_ms,
                error: None,
            }
        }
        Ok(Err(err)) => {
            warn!(provider = provider.id(), error = %err, "provider call failed");
            CallOutput {
                content: None,
                usage: TokenUsage::default(),
                cost_usd: 0.0,
                latency_ms,
                error: Some(err.to_string()),
            }
        }
        Err(_) => {
            warn!(provider = provider.id(), timeout_ms = timeout.as_millis() as u64, "provider call timed out");
            CallOutput {
                content: None,
                usage: TokenUsage::default(),
                cost_usd: 0.0,
                latency_ms,
                error: Some(format!("timed out after {}ms", timeout.as_millis())),
            }
        }
    }
}
