//! Call results, accumulators and the video-level output shape.

use serde::{Deserialize, Serialize};

use crate::types::item::ExtractionItem;
use crate::types::transcript::SourceType;

/// Token usage for a single provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// The outcome of one provider call. Never mutated after creation; a failed
/// call is represented as `items: []` with `error` set, not as an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallResult {
    pub provider_id: String,

    /// Consensus tier the call ran at (1 = cheapest). Zero for plain
    /// single-provider passes.
    pub tier: u8,

    pub items: Vec<ExtractionItem>,

    /// Self-reported confidence of the call as a whole, in [0, 1]
    pub confidence: f64,

    pub cost_usd: f64,
    pub latency_ms: u64,
    pub usage: TokenUsage,

    /// Set when the call failed or timed out; such results contribute zero
    /// items and do not abort the batch
    pub error: Option<String>,
}

impl ModelCallResult {
    /// A successful call.
    pub fn ok(provider_id: impl Into<String>, items: Vec<ExtractionItem>, confidence: f64) -> Self {
        Self {
            provider_id: provider_id.into(),
            tier: 0,
            items,
            confidence,
            cost_usd: 0.0,
            latency_ms: 0,
            usage: TokenUsage::default(),
            error: None,
        }
    }

    /// An error-shaped result for a failed or timed-out call.
    pub fn failed(provider_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            tier: 0,
            items: Vec::new(),
            confidence: 0.0,
            cost_usd: 0.0,
            latency_ms: 0,
            usage: TokenUsage::default(),
            error: Some(error.into()),
        }
    }

    pub fn with_tier(mut self, tier: u8) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage, cost_usd: f64) -> Self {
        self.usage = usage;
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Per-video accumulator for tokens, cost and call counts.
///
/// Passed `&mut` into each pipeline stage. Passes within a chunk never run
/// concurrently, so plain monotonic accumulation is safe under cooperative
/// scheduling; a truly multi-threaded port must replace this with atomics
/// or a single aggregator task.
#[derive(Debug, Clone, Default)]
pub struct CostAccumulator {
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_usd: f64,
    pub calls: u32,
    pub failed_calls: u32,
    pub dropped_items: u32,
}

impl CostAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed (possibly failed) provider call.
    pub fn record(&mut self, result: &ModelCallResult) {
        self.tokens_input += result.usage.input;
        self.tokens_output += result.usage.output;
        self.cost_usd += result.cost_usd;
        self.calls += 1;
        if result.is_error() {
            self.failed_calls += 1;
        }
    }

    /// Record items rejected by validation after retries exhausted.
    pub fn record_dropped(&mut self, count: usize) {
        self.dropped_items += count as u32;
    }

    pub fn tokens_total(&self) -> u64 {
        self.tokens_input + self.tokens_output
    }

    /// Fold a sub-accumulator (e.g. from one chunk) into this one.
    pub fn absorb(&mut self, other: &CostAccumulator) {
        self.tokens_input += other.tokens_input;
        self.tokens_output += other.tokens_output;
        self.cost_usd += other.cost_usd;
        self.calls += other.calls;
        self.failed_calls += other.failed_calls;
        self.dropped_items += other.dropped_items;
    }
}

/// Observability counters for the multi-pass controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiPassMetrics {
    pub pass1_items: usize,
    pub pass2_items: usize,
    /// merged count + materially-expanded summaries + entity-list growth
    pub pass3_improvements: usize,
    /// Which passes were skipped and why ("pass2: no gaps", ...)
    pub skipped_passes: Vec<String>,
}

/// Observability counters for consensus runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusMetrics {
    pub average_agreement: f64,
    pub conflicts_resolved: usize,
    pub tier1_items: usize,
    pub tier2_items: usize,
    pub tier3_items: usize,
    /// Heuristic accuracy estimate copied from configuration; not measured
    pub estimated_accuracy: Option<f64>,
}

/// The video-level result handed to downstream collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoExtractionResult {
    pub video_id: String,
    pub source_type: SourceType,
    pub items: Vec<ExtractionItem>,
    pub total_items: usize,
    pub processing_time_ms: u64,
    pub tokens_used: u64,
    pub estimated_cost_usd: f64,
    pub multi_pass: Option<MultiPassMetrics>,
    pub consensus: Option<ConsensusMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_records_failures() {
        let mut acc = CostAccumulator::new();
        let ok = ModelCallResult::ok("p1", vec![], 0.8)
            .with_usage(TokenUsage::new(100, 50), 0.002)
            .with_latency(120);
        let bad = ModelCallResult::failed("p1", "timeout");

        acc.record(&ok);
        acc.record(&bad);

        assert_eq!(acc.calls, 2);
        assert_eq!(acc.failed_calls, 1);
        assert_eq!(acc.tokens_total(), 150);
        assert!((acc.cost_usd - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_accumulator_absorb() {
        let mut a = CostAccumulator::new();
        a.tokens_input = 10;
        a.calls = 1;

        let mut b = CostAccumulator::new();
        b.tokens_input = 5;
        b.calls = 2;
        b.dropped_items = 1;

        a.absorb(&b);
        assert_eq!(a.tokens_input, 15);
        assert_eq!(a.calls, 3);
        assert_eq!(a.dropped_items, 1);
    }

    #[test]
    fn test_failed_result_shape() {
        let r = ModelCallResult::failed("tier1", "connection reset");
        assert!(r.is_error());
        assert!(r.items.is_empty());
        assert_eq!(r.confidence, 0.0);
    }
}
