//! Configuration types for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::providers::ProviderId;

/// How a new chunk overlaps its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapStrategy {
    /// Last 10% of segments
    Fixed,

    /// Last 10-20% of segments depending on boundary hardness
    Adaptive,

    /// Segments back to the most recent sentence terminator
    Semantic,
}

/// Options for transcript segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkOptions {
    /// Hard token ceiling per chunk
    pub max_tokens: usize,

    /// A hard boundary only closes a chunk once it exceeds this
    pub min_tokens: usize,

    /// Embedding cosine similarity below this marks a candidate boundary
    pub similarity_threshold: f64,

    pub overlap_strategy: OverlapStrategy,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            min_tokens: 300,
            similarity_threshold: 0.55,
            overlap_strategy: OverlapStrategy::Adaptive,
        }
    }
}

impl ChunkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_min_tokens(mut self, min: usize) -> Self {
        self.min_tokens = min;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_overlap_strategy(mut self, strategy: OverlapStrategy) -> Self {
        self.overlap_strategy = strategy;
        self
    }
}

/// Options for the multi-pass controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Run the gap-filling pass when gaps are found
    pub enable_gap_pass: bool,

    /// Run the refinement pass when there is something to merge
    pub enable_refinement: bool,

    /// Refinement is skipped above this item count (cost control)
    pub refinement_item_ceiling: usize,

    /// Bounded validation retries per call (total attempts = max_retries + 1)
    pub max_retries: u32,

    /// Base sampling temperature for extraction calls
    pub base_temperature: f32,

    /// Added to the temperature on each retry attempt
    pub retry_temperature_step: f32,

    /// Cumulative confidence adjustment below which a retry is forced
    pub retry_adjustment_floor: f64,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            enable_gap_pass: true,
            enable_refinement: true,
            refinement_item_ceiling: 20,
            max_retries: 2,
            base_temperature: 0.3,
            retry_temperature_step: 0.1,
            retry_adjustment_floor: -0.4,
        }
    }
}

impl PassConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single_pass() -> Self {
        Self {
            enable_gap_pass: false,
            enable_refinement: false,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_refinement_ceiling(mut self, ceiling: usize) -> Self {
        self.refinement_item_ceiling = ceiling;
        self
    }
}

/// Which consensus strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusStrategy {
    Hierarchical,
    Ensemble,
    Hybrid,
}

/// Configuration for the consensus engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub strategy: ConsensusStrategy,

    /// Tier-1: cheap/fast, always runs
    pub tier1: ProviderId,

    /// Tier-2: stronger model, runs on low-confidence items
    pub tier2: ProviderId,

    /// Tier-3: arbiter, invoked on tier-1/tier-2 conflicts. Absence means
    /// tier-2's result stands on conflict.
    pub tier3: Option<ProviderId>,

    /// Items below this tier-1 confidence escalate to tier-2
    pub tier2_threshold: f64,

    /// Tier-1/tier-2 confidence divergence beyond this invokes tier-3
    pub conflict_threshold: f64,

    /// Providers queried in parallel under the ensemble strategy
    pub ensemble_providers: Vec<ProviderId>,

    /// An item survives the ensemble iff this many providers produced it
    pub minimum_agreement: usize,

    /// Per-provider trust weights for confidence blending. Configuration,
    /// not computed; providers absent from the map weigh 1.0.
    #[serde(default)]
    pub trust_weights: HashMap<ProviderId, f64>,

    /// Heuristic accuracy estimate reported in `ConsensusMetrics`.
    /// Uncalibrated; carried through for observability only and never
    /// consulted by retention logic.
    pub estimated_accuracy_baseline: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            strategy: ConsensusStrategy::Hierarchical,
            tier1: ProviderId::OpenAiMini,
            tier2: ProviderId::OpenAi,
            tier3: None,
            tier2_threshold: 0.7,
            conflict_threshold: 0.25,
            ensemble_providers: vec![ProviderId::OpenAiMini, ProviderId::OpenAi],
            minimum_agreement: 2,
            trust_weights: HashMap::new(),
            estimated_accuracy_baseline: 0.92,
        }
    }
}

impl ConsensusConfig {
    pub fn hierarchical(tier1: ProviderId, tier2: ProviderId) -> Self {
        Self {
            strategy: ConsensusStrategy::Hierarchical,
            tier1,
            tier2,
            ..Self::default()
        }
    }

    pub fn ensemble(providers: Vec<ProviderId>, minimum_agreement: usize) -> Self {
        Self {
            strategy: ConsensusStrategy::Ensemble,
            ensemble_providers: providers,
            minimum_agreement,
            ..Self::default()
        }
    }

    pub fn with_arbiter(mut self, tier3: ProviderId) -> Self {
        self.tier3 = Some(tier3);
        self
    }

    pub fn with_trust_weight(mut self, provider: ProviderId, weight: f64) -> Self {
        self.trust_weights.insert(provider, weight);
        self
    }

    /// Trust weight for a provider (1.0 when unconfigured).
    pub fn trust_weight(&self, provider: &ProviderId) -> f64 {
        self.trust_weights.get(provider).copied().unwrap_or(1.0)
    }
}

/// Bounded fan-out options for chunk batches.
///
/// Backpressure is explicit: at most `concurrency` chunks are in flight,
/// with `delay_ms` between batches to respect provider rate limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub delay_ms: u64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            delay_ms: 500,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chunking: ChunkOptions,
    pub passes: PassConfig,

    /// When set, chunk extraction goes through the consensus engine
    /// instead of single-provider calls
    pub consensus: Option<ConsensusConfig>,

    pub batch: BatchOptions,

    /// Per-call timeout; a timed-out call becomes an error-shaped result
    pub call_timeout_ms: u64,

    /// Run the hallucination detector over surviving items (cost-bearing)
    pub hallucination_audit: bool,

    /// Items flagged `Reject` by the audit are removed from the output
    pub drop_rejected_items: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkOptions::default(),
            passes: PassConfig::default(),
            consensus: None,
            batch: BatchOptions::default(),
            call_timeout_ms: 60_000,
            hallucination_audit: false,
            drop_rejected_items: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consensus(mut self, consensus: ConsensusConfig) -> Self {
        self.consensus = Some(consensus);
        self
    }

    pub fn with_batch(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_hallucination_audit(mut self, enabled: bool) -> Self {
        self.hallucination_audit = enabled;
        self
    }

    pub fn with_call_timeout_ms(mut self, ms: u64) -> Self {
        self.call_timeout_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.batch.concurrency, 3);
        assert_eq!(c.passes.max_retries, 2);
        assert!(c.consensus.is_none());
    }

    #[test]
    fn test_trust_weight_fallback() {
        let c = ConsensusConfig::default().with_trust_weight(ProviderId::OpenAi, 1.2);
        assert_eq!(c.trust_weight(&ProviderId::OpenAi), 1.2);
        assert_eq!(c.trust_weight(&ProviderId::OpenAiMini), 1.0);
    }

    #[test]
    fn test_single_pass_config() {
        let c = PassConfig::single_pass();
        assert!(!c.enable_gap_pass);
        assert!(!c.enable_refinement);
    }
}
