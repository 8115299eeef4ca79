//! The engine - video-level orchestration.
//!
//! One `process_video` call runs the whole pipeline: quota gate, chunking,
//! bounded-concurrency chunk extraction (single-provider multi-pass or
//! consensus), optional hallucination audit, and the final cross-chunk
//! merge. Per-chunk failures are absorbed into the accounting; only
//! pre-flight problems (quota, empty input, cancellation) surface as
//! errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::future::join_all;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunker::Chunker;
use crate::consensus::{ConsensusEngine, ConsensusRequest};
use crate::error::{ExtractionError, Result};
use crate::hallucination::{ConfidenceAdjustment, HallucinationDetector};
use crate::pipeline::merge::merge_items;
use crate::pipeline::passes::{run_passes, PassContext};
use crate::providers::factory::ProviderId;
use crate::traits::provider::{Embedder, Provider};
use crate::traits::quota::QuotaGate;
use crate::types::chunk::Chunk;
use crate::types::config::EngineConfig;
use crate::types::item::{ConfidenceLevel, ExtractionItem};
use crate::types::result::{
    ConsensusMetrics, CostAccumulator, MultiPassMetrics, VideoExtractionResult,
};
use crate::types::transcript::{SourceType, Transcript, VideoMetadata};

/// The extraction engine. Construct once, process many videos.
pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    embedder: Option<Arc<dyn Embedder>>,
    consensus: Option<ConsensusEngine>,
    quota_gate: Option<Arc<dyn QuotaGate>>,
}

/// What one chunk contributed.
struct ChunkContribution {
    items: Vec<ExtractionItem>,
    acc: CostAccumulator,
    multi_pass: Option<MultiPassMetrics>,
    consensus: Option<ConsensusMetrics>,
}

impl Engine {
    pub fn new(config: EngineConfig, provider: Arc<dyn Provider>) -> Self {
        Self {
            config,
            provider,
            embedder: None,
            consensus: None,
            quota_gate: None,
        }
    }

    /// Attach an embedder, enabling the chunker's similarity signal and
    /// the audit's semantic check.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_quota_gate(mut self, gate: Arc<dyn QuotaGate>) -> Self {
        self.quota_gate = Some(gate);
        self
    }

    /// Wire up consensus. Requires `config.consensus` to be set and every
    /// provider the strategy names to be present in the map.
    pub fn with_consensus_providers(
        mut self,
        providers: std::collections::HashMap<ProviderId, Arc<dyn Provider>>,
    ) -> Result<Self> {
        let Some(consensus_config) = self.config.consensus.clone() else {
            return Err(ExtractionError::Configuration(
                "consensus providers supplied without a consensus configuration".into(),
            ));
        };
        self.consensus = Some(ConsensusEngine::new(consensus_config, providers)?);
        Ok(self)
    }

    /// Extract everything from one video transcript.
    pub async fn process_video(
        &self,
        transcript: &Transcript,
        meta: &VideoMetadata,
        source_type: SourceType,
    ) -> Result<VideoExtractionResult> {
        let started = Instant::now();

        self.preflight(transcript).await?;

        let chunks = self.chunk(transcript).await?;
        info!(
            video_id = %transcript.video_id,
            chunks = chunks.len(),
            source_type = source_type.as_str(),
            "transcript chunked"
        );

        let mut acc = CostAccumulator::new();
        let mut multi_pass = MultiPassMetrics::default();
        let mut consensus_metrics: Vec<ConsensusMetrics> = Vec::new();
        let mut collected: Vec<ExtractionItem> = Vec::new();

        let concurrency = self.config.batch.concurrency.max(1);
        for (batch_index, batch) in chunks.chunks(concurrency).enumerate() {
            if batch_index > 0 && self.config.batch.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch.delay_ms)).await;
            }

            let futures = batch
                .iter()
                .map(|chunk| self.process_chunk(chunk, transcript, meta, source_type));
            for contribution in join_all(futures).await {
                acc.absorb(&contribution.acc);
                if let Some(m) = contribution.multi_pass {
                    fold_multi_pass(&mut multi_pass, m);
                }
                if let Some(m) = contribution.consensus {
                    consensus_metrics.push(m);
                }
                collected.extend(contribution.items);
            }
        }

        let items = merge_items(collected);
        debug!(
            video_id = %transcript.video_id,
            items = items.len(),
            dropped = acc.dropped_items,
            cost_usd = acc.cost_usd,
            "extraction complete"
        );

        Ok(VideoExtractionResult {
            video_id: transcript.video_id.clone(),
            source_type,
            total_items: items.len(),
            items,
            processing_time_ms: started.elapsed().as_millis() as u64,
            tokens_used: acc.tokens_total(),
            estimated_cost_usd: acc.cost_usd,
            multi_pass: self.consensus.is_none().then_some(multi_pass),
            consensus: fold_consensus(consensus_metrics),
        })
    }

    /// Streaming variant: items are yielded chunk by chunk as extraction
    /// progresses, in chunk order.
    pub fn process_stream<'a>(
        &'a self,
        transcript: &'a Transcript,
        meta: &'a VideoMetadata,
        source_type: SourceType,
    ) -> impl Stream<Item = Result<Vec<ExtractionItem>>> + 'a {
        stream! {
            if let Err(err) = self.preflight(transcript).await {
                yield Err(err);
                return;
            }
            let chunks = match self.chunk(transcript).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            for chunk in chunks {
                let contribution = self
                    .process_chunk(&chunk, transcript, meta, source_type)
                    .await;
                yield Ok(contribution.items);
            }
        }
    }

    /// `process_video` that aborts with `ExtractionError::Cancelled` when
    /// the token fires.
    pub async fn process_with_cancel(
        &self,
        transcript: &Transcript,
        meta: &VideoMetadata,
        source_type: SourceType,
        cancel: &CancellationToken,
    ) -> Result<VideoExtractionResult> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ExtractionError::Cancelled),
            result = self.process_video(transcript, meta, source_type) => result,
        }
    }

    async fn preflight(&self, transcript: &Transcript) -> Result<()> {
        if let Some(gate) = &self.quota_gate {
            gate.check(&transcript.video_id).await?;
        }
        if transcript.text.trim().is_empty() {
            return Err(ExtractionError::InvalidInput {
                reason: "transcript text is empty".into(),
            });
        }
        Ok(())
    }

    async fn chunk(&self, transcript: &Transcript) -> Result<Vec<Chunk>> {
        let chunks = match &self.embedder {
            Some(embedder) => {
                Chunker::with_embedder(embedder.as_ref())
                    .segment(transcript, &self.config.chunking)
                    .await?
            }
            None => {
                Chunker::new()
                    .segment(transcript, &self.config.chunking)
                    .await?
            }
        };
        Ok(chunks)
    }

    async fn process_chunk(
        &self,
        chunk: &Chunk,
        transcript: &Transcript,
        meta: &VideoMetadata,
        source_type: SourceType,
    ) -> ChunkContribution {
        let mut acc = CostAccumulator::new();
        let timeout = Duration::from_millis(self.config.call_timeout_ms);

        let (items, multi_pass, consensus) = match &self.consensus {
            Some(engine) => {
                let req = ConsensusRequest {
                    source_type,
                    video_id: &transcript.video_id,
                    meta,
                    passes: &self.config.passes,
                    timeout,
                };
                let outcome = engine.extract_chunk(&req, chunk, &mut acc).await;
                let metrics = outcome.metrics.clone();
                (outcome.items(), None, Some(metrics))
            }
            None => {
                let ctx = PassContext {
                    provider: self.provider.as_ref(),
                    source_type,
                    video_id: &transcript.video_id,
                    meta,
                    config: &self.config.passes,
                    timeout,
                };
                let outcome = run_passes(&ctx, chunk, &mut acc).await;
                (outcome.items, Some(outcome.metrics), None)
            }
        };

        let items = if self.config.hallucination_audit {
            self.audit(items, chunk, &mut acc).await
        } else {
            items
        };

        ChunkContribution {
            items,
            acc,
            multi_pass,
            consensus,
        }
    }

    async fn audit(
        &self,
        items: Vec<ExtractionItem>,
        chunk: &Chunk,
        acc: &mut CostAccumulator,
    ) -> Vec<ExtractionItem> {
        let detector = match &self.embedder {
            Some(embedder) => HallucinationDetector::with_embedder(embedder.as_ref()),
            None => HallucinationDetector::new(),
        };

        let mut kept = Vec::with_capacity(items.len());
        for mut item in items {
            let check = detector.audit(&item, chunk).await;
            match check.recommended_adjustment {
                ConfidenceAdjustment::High => {}
                ConfidenceAdjustment::Medium => {
                    let base = item.base_mut();
                    base.confidence = base.confidence.min(ConfidenceLevel::Medium);
                }
                ConfidenceAdjustment::Low => {
                    item.base_mut().confidence = ConfidenceLevel::Low;
                }
                ConfidenceAdjustment::Reject => {
                    if self.config.drop_rejected_items {
                        warn!(
                            title = item.title(),
                            issues = check.issues.len(),
                            "item rejected by hallucination audit"
                        );
                        acc.record_dropped(1);
                        continue;
                    }
                    item.base_mut().confidence = ConfidenceLevel::Low;
                }
            }
            kept.push(item);
        }
        kept
    }
}

fn fold_multi_pass(total: &mut MultiPassMetrics, chunk: MultiPassMetrics) {
    total.pass1_items += chunk.pass1_items;
    total.pass2_items += chunk.pass2_items;
    total.pass3_improvements += chunk.pass3_improvements;
    total.skipped_passes.extend(chunk.skipped_passes);
}

fn fold_consensus(per_chunk: Vec<ConsensusMetrics>) -> Option<ConsensusMetrics> {
    if per_chunk.is_empty() {
        return None;
    }
    let n = per_chunk.len() as f64;
    let mut folded = ConsensusMetrics::default();
    let mut accuracy_sum = 0.0;
    let mut accuracy_count = 0usize;
    for m in per_chunk {
        folded.average_agreement += m.average_agreement / n;
        folded.conflicts_resolved += m.conflicts_resolved;
        folded.tier1_items += m.tier1_items;
        folded.tier2_items += m.tier2_items;
        folded.tier3_items += m.tier3_items;
        if let Some(a) = m.estimated_accuracy {
            accuracy_sum += a;
            accuracy_count += 1;
        }
    }
    if accuracy_count > 0 {
        folded.estimated_accuracy = Some(accuracy_sum / accuracy_count as f64);
    }
    Some(folded)
}
