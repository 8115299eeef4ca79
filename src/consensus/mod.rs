//! Multi-provider consensus.
//!
//! Three strategies over the same vote bookkeeping:
//!
//! - hierarchical: a cheap tier-1 model extracts everything; items below
//!   the confidence threshold escalate to tier-2, and a large tier-1/
//!   tier-2 divergence invokes the optional tier-3 arbiter,
//! - ensemble: every configured provider extracts in parallel and an item
//!   survives only with enough independent agreement,
//! - hybrid: the intersection of the other two; an item must survive
//!   both the hierarchical and the ensemble path.
//!
//! Hierarchical consensus downgrades unconfirmed items instead of dropping
//! them; only the ensemble's minimum-agreement rule discards outright.
//! Cross-provider agreement is matched on the dedup key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;

use crate::error::{ExtractionError, Result};
use crate::pipeline::passes::{run_passes, PassContext};
use crate::providers::factory::ProviderId;
use crate::traits::provider::Provider;
use crate::types::config::{ConsensusConfig, ConsensusStrategy, PassConfig};
use crate::types::consensus::{ItemConsensus, ProviderMetrics, ProviderVote};
use crate::types::item::{ConfidenceLevel, ExtractionItem};
use crate::types::chunk::Chunk;
use crate::types::result::{ConsensusMetrics, CostAccumulator};
use crate::types::transcript::{SourceType, VideoMetadata};

/// Per-chunk inputs that are constant across providers.
pub struct ConsensusRequest<'a> {
    pub source_type: SourceType,
    pub video_id: &'a str,
    pub meta: &'a VideoMetadata,
    pub passes: &'a PassConfig,
    pub timeout: Duration,
}

/// One chunk's consensus result.
#[derive(Debug, Default)]
pub struct ConsensusOutcome {
    pub consensus: Vec<ItemConsensus>,
    pub metrics: ConsensusMetrics,
}

impl ConsensusOutcome {
    pub fn items(self) -> Vec<ExtractionItem> {
        self.consensus.into_iter().map(|c| c.item).collect()
    }
}

/// Runs one of the consensus strategies over a chunk.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    metrics: Mutex<HashMap<ProviderId, ProviderMetrics>>,
}

impl ConsensusEngine {
    /// Fails fast when a provider the strategy needs was not supplied.
    pub fn new(
        config: ConsensusConfig,
        providers: HashMap<ProviderId, Arc<dyn Provider>>,
    ) -> Result<Self> {
        let mut required: Vec<ProviderId> = match config.strategy {
            ConsensusStrategy::Hierarchical => vec![config.tier1, config.tier2],
            ConsensusStrategy::Ensemble => config.ensemble_providers.clone(),
            ConsensusStrategy::Hybrid => {
                let mut ids = config.ensemble_providers.clone();
                ids.push(config.tier1);
                ids.push(config.tier2);
                ids
            }
        };
        required.extend(config.tier3);

        for id in &required {
            if !providers.contains_key(id) {
                return Err(ExtractionError::Configuration(format!(
                    "consensus strategy requires provider '{}' which was not supplied",
                    id.as_str()
                )));
            }
        }

        Ok(Self {
            config,
            providers,
            metrics: Mutex::new(HashMap::new()),
        })
    }

    /// Per-provider monitoring counters accumulated so far.
    pub fn provider_metrics(&self) -> HashMap<ProviderId, ProviderMetrics> {
        self.metrics.lock().expect("metrics lock").clone()
    }

    /// Run the configured strategy over one chunk.
    pub async fn extract_chunk(
        &self,
        req: &ConsensusRequest<'_>,
        chunk: &Chunk,
        acc: &mut CostAccumulator,
    ) -> ConsensusOutcome {
        let mut outcome = match self.config.strategy {
            ConsensusStrategy::Hierarchical => self.hierarchical(req, chunk, acc).await,
            ConsensusStrategy::Ensemble => self.ensemble(req, chunk, acc).await,
            ConsensusStrategy::Hybrid => self.hybrid(req, chunk, acc).await,
        };

        finalize_metrics(&mut outcome, &self.config);
        outcome
    }

    async fn hierarchical(
        &self,
        req: &ConsensusRequest<'_>,
        chunk: &Chunk,
        acc: &mut CostAccumulator,
    ) -> ConsensusOutcome {
        let tier1 = self.config.tier1;
        let tier1_items = self.extract_with(tier1, req, chunk, acc).await;

        let mut settled = Vec::new();
        let mut escalated = Vec::new();
        for item in tier1_items {
            let confidence = item.base().confidence.as_score();
            if confidence >= self.config.tier2_threshold {
                settled.push(ItemConsensus::unanimous(item, tier1.as_str(), confidence));
            } else {
                escalated.push(item);
            }
        }

        let mut metrics = ConsensusMetrics {
            tier1_items: settled.len(),
            tier2_items: escalated.len(),
            ..Default::default()
        };

        if !escalated.is_empty() {
            let tier2 = self.config.tier2;
            let tier2_items = self.extract_with(tier2, req, chunk, acc).await;
            let tier2_by_key: HashMap<String, &ExtractionItem> =
                tier2_items.iter().map(|i| (i.dedup_key(), i)).collect();

            // Arbitration is one extraction shared by every conflicted item
            let mut tier3_by_key: Option<HashMap<String, ExtractionItem>> = None;

            for item in escalated {
                let t1_conf = item.base().confidence.as_score();
                let key = item.dedup_key();

                let Some(confirmation) = tier2_by_key.get(&key) else {
                    // Unconfirmed: downgrade, never drop
                    let mut item = item;
                    item.base_mut().confidence = ConfidenceLevel::Low;
                    settled.push(ItemConsensus {
                        item,
                        agreement_count: 1,
                        total_models: 2,
                        agreement_ratio: 0.5,
                        votes: vec![
                            vote(tier1, true, t1_conf),
                            vote(tier2, false, 0.0),
                        ],
                        conflict_resolved: false,
                        resolved_by: None,
                        final_confidence: t1_conf * 0.5,
                    });
                    continue;
                };

                let t2_conf = confirmation.base().confidence.as_score();
                let divergence = (t2_conf - t1_conf).abs();

                if divergence > self.config.conflict_threshold {
                    metrics.conflicts_resolved += 1;

                    if let Some(arbiter) = self.config.tier3 {
                        if tier3_by_key.is_none() {
                            let items = self.extract_with(arbiter, req, chunk, acc).await;
                            tier3_by_key = Some(
                                items.into_iter().map(|i| (i.dedup_key(), i)).collect(),
                            );
                        }
                        metrics.tier3_items += 1;

                        let arbitrated = tier3_by_key.as_ref().and_then(|m| m.get(&key));
                        let (resolved_item, final_confidence) = match arbitrated {
                            Some(a) => (a.clone(), a.base().confidence.as_score()),
                            // Arbiter silent on the item: tier-2 stands
                            None => ((*confirmation).clone(), t2_conf),
                        };
                        settled.push(ItemConsensus {
                            item: resolved_item,
                            agreement_count: 2,
                            total_models: 3,
                            agreement_ratio: 2.0 / 3.0,
                            votes: vec![
                                vote(tier1, true, t1_conf),
                                vote(tier2, true, t2_conf),
                                vote(arbiter, arbitrated.is_some(), final_confidence),
                            ],
                            conflict_resolved: true,
                            resolved_by: Some(arbiter.as_str().to_string()),
                            final_confidence,
                        });
                    } else {
                        // No arbiter configured: the stronger model stands
                        settled.push(ItemConsensus {
                            item: (*confirmation).clone(),
                            agreement_count: 2,
                            total_models: 2,
                            agreement_ratio: 1.0,
                            votes: vec![vote(tier1, true, t1_conf), vote(tier2, true, t2_conf)],
                            conflict_resolved: true,
                            resolved_by: Some(tier2.as_str().to_string()),
                            final_confidence: t2_conf,
                        });
                    }
                } else {
                    // Confirmed: prefer the stronger model's rendition,
                    // blend confidence by trust weight
                    let final_confidence = self.blend(&[(tier1, t1_conf), (tier2, t2_conf)]);
                    let mut item = (*confirmation).clone();
                    item.base_mut().confidence = ConfidenceLevel::from_score(final_confidence);
                    settled.push(ItemConsensus {
                        item,
                        agreement_count: 2,
                        total_models: 2,
                        agreement_ratio: 1.0,
                        votes: vec![vote(tier1, true, t1_conf), vote(tier2, true, t2_conf)],
                        conflict_resolved: false,
                        resolved_by: None,
                        final_confidence,
                    });
                }
            }
        }

        ConsensusOutcome {
            consensus: settled,
            metrics,
        }
    }

    async fn ensemble(
        &self,
        req: &ConsensusRequest<'_>,
        chunk: &Chunk,
        acc: &mut CostAccumulator,
    ) -> ConsensusOutcome {
        let provider_ids = self.config.ensemble_providers.clone();

        // Parallel fan-out; each provider gets its own sub-accumulator
        let futures = provider_ids.iter().map(|id| {
            let id = *id;
            async move {
                let mut sub = CostAccumulator::new();
                let items = self.extract_with(id, req, chunk, &mut sub).await;
                (id, items, sub)
            }
        });
        let results = join_all(futures).await;

        let mut per_provider: Vec<(ProviderId, HashMap<String, ExtractionItem>)> = Vec::new();
        for (id, items, sub) in results {
            acc.absorb(&sub);
            per_provider.push((id, items.into_iter().map(|i| (i.dedup_key(), i)).collect()));
        }

        // First-seen key order keeps the output deterministic
        let mut key_order: Vec<String> = Vec::new();
        for (_, by_key) in &per_provider {
            for key in by_key.keys() {
                if !key_order.contains(key) {
                    key_order.push(key.clone());
                }
            }
        }

        let total_models = per_provider.len();
        let mut consensus = Vec::new();
        for key in key_order {
            let mut votes = Vec::new();
            let mut agreeing: Vec<(ProviderId, &ExtractionItem)> = Vec::new();
            for (id, by_key) in &per_provider {
                match by_key.get(&key) {
                    Some(item) => {
                        votes.push(vote(*id, true, item.base().confidence.as_score()));
                        agreeing.push((*id, item));
                    }
                    None => votes.push(vote(*id, false, 0.0)),
                }
            }

            if agreeing.len() < self.config.minimum_agreement {
                tracing::debug!(
                    %key,
                    agreement = agreeing.len(),
                    required = self.config.minimum_agreement,
                    "item discarded below minimum agreement"
                );
                continue;
            }

            let weighted: Vec<(ProviderId, f64)> = agreeing
                .iter()
                .map(|(id, item)| (*id, item.base().confidence.as_score()))
                .collect();
            let final_confidence = self.blend(&weighted);

            // The most trusted agreeing provider supplies the rendition
            let (_, representative) = agreeing
                .iter()
                .max_by(|(a, _), (b, _)| {
                    self.config
                        .trust_weight(a)
                        .partial_cmp(&self.config.trust_weight(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .copied()
                .unwrap_or(agreeing[0]);

            let mut item = representative.clone();
            item.base_mut().confidence = ConfidenceLevel::from_score(final_confidence);

            consensus.push(ItemConsensus {
                item,
                agreement_count: agreeing.len(),
                total_models,
                agreement_ratio: agreeing.len() as f64 / total_models.max(1) as f64,
                votes,
                conflict_resolved: false,
                resolved_by: None,
                final_confidence,
            });
        }

        let metrics = ConsensusMetrics {
            tier1_items: consensus.len(),
            ..Default::default()
        };
        ConsensusOutcome { consensus, metrics }
    }

    /// Intersection of the hierarchical and ensemble result sets: an item
    /// survives only when both strategies produced it. The hierarchical
    /// side supplies the rendition and the escalation bookkeeping; the
    /// ensemble's votes are folded in and the final confidence averages
    /// the two strategies.
    async fn hybrid(
        &self,
        req: &ConsensusRequest<'_>,
        chunk: &Chunk,
        acc: &mut CostAccumulator,
    ) -> ConsensusOutcome {
        let hierarchical = self.hierarchical(req, chunk, acc).await;
        let ensemble = self.ensemble(req, chunk, acc).await;

        let ensemble_by_key: HashMap<String, ItemConsensus> = ensemble
            .consensus
            .into_iter()
            .map(|c| (c.item.dedup_key(), c))
            .collect();

        let mut consensus = Vec::new();
        for mut c in hierarchical.consensus {
            let key = c.item.dedup_key();
            let Some(confirmation) = ensemble_by_key.get(&key) else {
                tracing::debug!(%key, "item discarded: not in the ensemble result set");
                continue;
            };

            for v in &confirmation.votes {
                if !c.votes.iter().any(|held| held.provider_id == v.provider_id) {
                    c.votes.push(v.clone());
                }
            }
            c.agreement_count = c.votes.iter().filter(|v| v.agreed).count();
            c.total_models = c.votes.len();
            c.agreement_ratio = c.agreement_count as f64 / c.total_models.max(1) as f64;
            c.final_confidence = (c.final_confidence + confirmation.final_confidence) / 2.0;
            c.item.base_mut().confidence = ConfidenceLevel::from_score(c.final_confidence);
            consensus.push(c);
        }

        ConsensusOutcome {
            consensus,
            metrics: hierarchical.metrics,
        }
    }

    /// Trust-weighted average of per-provider confidences.
    fn blend(&self, confidences: &[(ProviderId, f64)]) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (id, confidence) in confidences {
            let w = self.config.trust_weight(id);
            weighted += w * confidence;
            total += w;
        }
        if total == 0.0 {
            0.0
        } else {
            weighted / total
        }
    }

    async fn extract_with(
        &self,
        id: ProviderId,
        req: &ConsensusRequest<'_>,
        chunk: &Chunk,
        acc: &mut CostAccumulator,
    ) -> Vec<ExtractionItem> {
        let provider = self
            .providers
            .get(&id)
            .expect("provider presence checked in new()");

        // Consensus providers each run one validated extraction; the
        // gap and refinement passes belong to the single-provider path
        let single = PassConfig {
            enable_gap_pass: false,
            enable_refinement: false,
            ..req.passes.clone()
        };
        let ctx = PassContext {
            provider: provider.as_ref(),
            source_type: req.source_type,
            video_id: req.video_id,
            meta: req.meta,
            config: &single,
            timeout: req.timeout,
        };

        let mut sub = CostAccumulator::new();
        let items = run_passes(&ctx, chunk, &mut sub).await.items;
        self.record_provider(id, &items, &sub);
        acc.absorb(&sub);
        items
    }

    fn record_provider(&self, id: ProviderId, items: &[ExtractionItem], sub: &CostAccumulator) {
        let avg_confidence = if items.is_empty() {
            0.0
        } else {
            items
                .iter()
                .map(|i| i.base().confidence.as_score())
                .sum::<f64>()
                / items.len() as f64
        };
        self.metrics.lock().expect("metrics lock").entry(id).or_default().record_call(
            avg_confidence,
            sub.cost_usd,
            sub.failed_calls > 0 && items.is_empty(),
        );
    }
}

fn vote(id: ProviderId, agreed: bool, confidence: f64) -> ProviderVote {
    ProviderVote {
        provider_id: id.as_str().to_string(),
        agreed,
        confidence,
    }
}

fn finalize_metrics(outcome: &mut ConsensusOutcome, config: &ConsensusConfig) {
    let n = outcome.consensus.len();
    outcome.metrics.average_agreement = if n == 0 {
        0.0
    } else {
        outcome
            .consensus
            .iter()
            .map(|c| c.agreement_ratio)
            .sum::<f64>()
            / n as f64
    };
    outcome.metrics.estimated_accuracy =
        Some(config.estimated_accuracy_baseline * outcome.metrics.average_agreement);
}
