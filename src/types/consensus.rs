//! Consensus bookkeeping types.

use serde::{Deserialize, Serialize};

use crate::types::item::ExtractionItem;

/// One provider's vote on an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVote {
    pub provider_id: String,
    pub agreed: bool,
    pub confidence: f64,
}

/// Agreement record for a single item, derived and read-only once computed.
///
/// Recorded for every strategy so that downstream audits can see how each
/// provider voted, whether a conflict was escalated, and who resolved it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConsensus {
    pub item: ExtractionItem,
    pub agreement_count: usize,
    pub total_models: usize,
    pub agreement_ratio: f64,
    pub votes: Vec<ProviderVote>,
    pub conflict_resolved: bool,
    /// Provider that settled the conflict (the tier-3 arbiter, usually)
    pub resolved_by: Option<String>,
    pub final_confidence: f64,
}

impl ItemConsensus {
    /// An uncontested item (single provider, no escalation).
    pub fn unanimous(item: ExtractionItem, provider_id: impl Into<String>, confidence: f64) -> Self {
        let provider_id = provider_id.into();
        Self {
            item,
            agreement_count: 1,
            total_models: 1,
            agreement_ratio: 1.0,
            votes: vec![ProviderVote {
                provider_id,
                agreed: true,
                confidence,
            }],
            conflict_resolved: false,
            resolved_by: None,
            final_confidence: confidence,
        }
    }
}

/// Running performance metrics for one provider. Monitoring only; never a
/// correctness dependency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub calls: u64,
    pub errors: u64,
    pub total_confidence: f64,
    pub total_cost_usd: f64,
}

impl ProviderMetrics {
    pub fn record_call(&mut self, confidence: f64, cost_usd: f64, failed: bool) {
        self.calls += 1;
        if failed {
            self.errors += 1;
        } else {
            self.total_confidence += confidence;
        }
        self.total_cost_usd += cost_usd;
    }

    pub fn average_confidence(&self) -> f64 {
        let successes = self.calls - self.errors;
        if successes == 0 {
            0.0
        } else {
            self.total_confidence / successes as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.errors as f64 / self.calls as f64
        }
    }
}
