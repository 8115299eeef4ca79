//! Rate-limited provider wrapper.
//!
//! Wraps any Provider implementation with rate limiting using the governor
//! crate. Complements the batch-level inter-batch delay with a per-call
//! ceiling.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::Result;
use crate::traits::provider::{CompletionRequest, CompletionResponse, Provider};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A provider wrapper that enforces a calls-per-second limit.
pub struct RateLimitedProvider<P: Provider> {
    inner: P,
    limiter: Arc<DirectRateLimiter>,
}

impl<P: Provider> RateLimitedProvider<P> {
    /// Limit the wrapped provider to `calls_per_second` sustained calls.
    pub fn new(provider: P, calls_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(calls_per_second).unwrap_or(nonzero!(1u32)),
        );
        Self {
            inner: provider,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Custom quota, e.g. per-minute limits with burst.
    pub fn with_quota(provider: P, quota: Quota) -> Self {
        Self {
            inner: provider,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<P: Provider> Provider for RateLimitedProvider<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.limiter.until_ready().await;
        self.inner.complete(request).await
    }

    fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        self.inner.calculate_cost(input_tokens, output_tokens)
    }
}
