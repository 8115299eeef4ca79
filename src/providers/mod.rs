//! Provider implementations and the compile-time-checked factory.

pub mod factory;
pub mod openai;
pub mod rate_limited;

pub use factory::{ProviderFactory, ProviderId};
pub use openai::OpenAiProvider;
pub use rate_limited::RateLimitedProvider;
