//! Typed errors for the extraction engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Per-call and per-item failures are deliberately *not* modeled here:
//! a failed provider call is absorbed into `ModelCallResult::error` and a
//! rejected item is simply dropped. Only errors that should reach the
//! caller (configuration, quota, cancellation, malformed input) appear in
//! this taxonomy.

use thiserror::Error;

/// Errors that can occur during transcript extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Missing or invalid configuration (e.g. credential absent for a
    /// configured provider tier). Fatal and caller-visible.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A provider call failed in a way that cannot be absorbed locally
    /// (e.g. request construction failed before any call was issued).
    #[error("provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Upstream budget already spent; the current video is skipped.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Embedding generation failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Model returned JSON we could not parse even after salvage.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Input rejected before any work started (e.g. empty transcript).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl ExtractionError {
    /// Wrap an arbitrary provider-side error.
    pub fn provider(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Provider(err.into())
    }

    /// Shorthand for a provider error from a plain message.
    pub fn provider_msg(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into().into())
    }
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExtractionError::Configuration("OPENAI_API_KEY not set".into());
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = ExtractionError::QuotaExceeded("0 transcription minutes left".into());
        assert!(err.to_string().starts_with("quota exceeded"));
    }

    #[test]
    fn test_provider_wrapping() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline");
        let err = ExtractionError::provider(io);
        assert!(matches!(err, ExtractionError::Provider(_)));
    }
}
