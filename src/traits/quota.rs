//! Quota gating - an upstream budget check the engine consults before
//! spending provider money on a video.

use async_trait::async_trait;

use crate::error::Result;

/// Checked once per video before any chunking or provider call. Return
/// `ExtractionError::QuotaExceeded` to skip the video.
#[async_trait]
pub trait QuotaGate: Send + Sync {
    async fn check(&self, video_id: &str) -> Result<()>;
}
