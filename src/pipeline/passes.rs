//! The multi-pass extraction controller.
//!
//! Each chunk gets up to three passes against a single provider:
//!
//! 1. broad extraction of every item in the chunk,
//! 2. gap-filling focused on what pass 1 provably missed,
//! 3. refinement, which merges duplicates and enriches summaries.
//!
//! Every provider call runs through the same validate-and-retry loop:
//! structural failures and a sinking cumulative confidence adjustment
//! trigger a retry with the validator's findings embedded as corrective
//! feedback, at a slightly higher temperature. Retries are bounded; items
//! that never validate are dropped and counted, never silently kept.

use std::time::Duration;

use crate::pipeline::call::timed_call;
use crate::pipeline::gaps::analyze_gaps;
use crate::pipeline::parse::{parse_extraction_response, transform_items, items_to_model_json};
use crate::pipeline::prompts::{
    broad_pass_prompt, corrective_feedback_prompt, gap_pass_prompt, refinement_prompt,
    system_prompt,
};
use crate::traits::provider::{CompletionRequest, Provider};
use crate::types::chunk::Chunk;
use crate::types::config::PassConfig;
use crate::types::item::{ConfidenceLevel, ExtractionItem};
use crate::types::result::{CostAccumulator, ModelCallResult, MultiPassMetrics};
use crate::types::transcript::{SourceType, VideoMetadata};
use crate::validate::validate;

/// How much a summary must grow for the refinement pass to count it as
/// an improvement.
const SUMMARY_GROWTH_CHARS: usize = 20;

/// Everything the controller needs that is constant across chunks.
pub struct PassContext<'a> {
    pub provider: &'a dyn Provider,
    pub source_type: SourceType,
    pub video_id: &'a str,
    pub meta: &'a VideoMetadata,
    pub config: &'a PassConfig,
    pub timeout: Duration,
}

/// The controller's output for one chunk.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub items: Vec<ExtractionItem>,
    pub metrics: MultiPassMetrics,
}

/// Run the configured passes over one chunk.
pub async fn run_passes(
    ctx: &PassContext<'_>,
    chunk: &Chunk,
    acc: &mut CostAccumulator,
) -> ChunkOutcome {
    let mut metrics = MultiPassMetrics::default();
    let system = system_prompt(ctx.source_type);

    // Pass 1: broad extraction
    let mut items =
        call_and_validate(ctx, chunk, &system, &broad_pass_prompt(&chunk.text), acc).await;
    metrics.pass1_items = items.len();

    // Pass 2: gap-filling
    if !ctx.config.enable_gap_pass {
        metrics.skipped_passes.push("pass2: disabled".into());
    } else if items.is_empty() {
        metrics.skipped_passes.push("pass2: no pass-1 items".into());
    } else if items.iter().all(|i| i.base().confidence == ConfidenceLevel::High) {
        metrics
            .skipped_passes
            .push("pass2: all items high confidence".into());
    } else {
        let gaps = analyze_gaps(&items, chunk);
        if !gaps.should_run_gap_pass {
            metrics.skipped_passes.push("pass2: no gaps".into());
        } else {
            let existing_titles: Vec<String> =
                items.iter().map(|i| i.title().to_string()).collect();
            let prompt = gap_pass_prompt(&chunk.text, &gaps, &existing_titles);
            let new_items = call_and_validate(ctx, chunk, &system, &prompt, acc).await;

            let before = items.len();
            merge_new_items(&mut items, new_items);
            metrics.pass2_items = items.len() - before;
        }
    }

    // Pass 3: refinement
    if !ctx.config.enable_refinement {
        metrics.skipped_passes.push("pass3: disabled".into());
    } else if items.len() < 2 {
        metrics.skipped_passes.push("pass3: fewer than 2 items".into());
    } else if items.len() > ctx.config.refinement_item_ceiling {
        metrics
            .skipped_passes
            .push("pass3: item count above ceiling".into());
    } else {
        let prompt = refinement_prompt(&chunk.text, &items_to_model_json(&items));
        let refined = call_and_validate(ctx, chunk, &system, &prompt, acc).await;

        // Refinement may merge but never invent: an empty or grown list
        // means the model did not follow the contract, keep the originals
        if refined.is_empty() || refined.len() > items.len() {
            tracing::debug!(
                before = items.len(),
                after = refined.len(),
                "refinement output rejected, keeping pass-2 items"
            );
        } else {
            metrics.pass3_improvements = count_improvements(&items, &refined);
            items = refined;
        }
    }

    ChunkOutcome { items, metrics }
}

/// One extraction call with bounded validation retries.
///
/// Retries when the response fails structurally (unparseable, schema
/// violations) or when the summed confidence adjustment across items sinks
/// below the configured floor. Each retry re-embeds the validator findings
/// and bumps the temperature by one step. Whatever validates on the final
/// attempt is kept; the rest is dropped and counted.
async fn call_and_validate(
    ctx: &PassContext<'_>,
    chunk: &Chunk,
    system: &str,
    user_prompt: &str,
    acc: &mut CostAccumulator,
) -> Vec<ExtractionItem> {
    let attempts = ctx.config.max_retries + 1;
    let mut prompt = user_prompt.to_string();

    for attempt in 0..attempts {
        let temperature =
            ctx.config.base_temperature + ctx.config.retry_temperature_step * attempt as f32;
        let request = CompletionRequest::new(system, &prompt).with_temperature(temperature);

        let output = timed_call(ctx.provider, &request, ctx.timeout).await;
        let call = match &output.error {
            Some(error) => ModelCallResult::failed(ctx.provider.id(), error.clone()),
            None => ModelCallResult::ok(ctx.provider.id(), Vec::new(), 0.0),
        }
        .with_usage(output.usage, output.cost_usd)
        .with_latency(output.latency_ms);
        acc.record(&call);

        if output.is_error() {
            // Transport failures retry as-is; feedback would not help
            if attempt + 1 < attempts {
                continue;
            }
            return Vec::new();
        }

        let content = output.content.unwrap_or_default();
        let raw = match parse_extraction_response(&content) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::debug!(%error, attempt, "extraction response unparseable");
                if attempt + 1 < attempts {
                    prompt = corrective_feedback_prompt(
                        user_prompt,
                        &["response was not valid JSON matching the schema".to_string()],
                        &[],
                    );
                    continue;
                }
                return Vec::new();
            }
        };

        let candidates = transform_items(raw.items, ctx.video_id, ctx.meta);

        let mut valid = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut structural_failure = false;
        let mut cumulative_adjustment = 0.0;
        let mut dropped = 0usize;

        for mut item in candidates {
            let outcome = validate(&item, chunk, ctx.source_type);
            structural_failure |= outcome.should_retry;
            cumulative_adjustment += outcome.confidence_adjustment;
            errors.extend(outcome.errors);
            warnings.extend(outcome.warnings);

            if outcome.is_valid {
                if outcome.confidence_adjustment < 0.0 {
                    let base = item.base_mut();
                    let adjusted = base.confidence.as_score() + outcome.confidence_adjustment;
                    base.confidence = ConfidenceLevel::from_score(adjusted);
                }
                valid.push(item);
            } else {
                dropped += 1;
            }
        }

        let needs_retry =
            structural_failure || cumulative_adjustment < ctx.config.retry_adjustment_floor;
        if needs_retry && attempt + 1 < attempts {
            tracing::debug!(
                attempt,
                cumulative_adjustment,
                errors = errors.len(),
                "retrying with corrective feedback"
            );
            prompt = corrective_feedback_prompt(user_prompt, &errors, &warnings);
            continue;
        }

        acc.record_dropped(dropped);
        return valid;
    }

    Vec::new()
}

/// Append pass-2 items that are not duplicates of existing ones.
fn merge_new_items(items: &mut Vec<ExtractionItem>, new_items: Vec<ExtractionItem>) {
    for item in new_items {
        let key = item.dedup_key();
        if !items.iter().any(|existing| existing.dedup_key() == key) {
            items.push(item);
        }
    }
}

/// Count what refinement actually improved: merges, materially longer
/// summaries, grown entity lists. Surviving items are matched to their
/// originals by title.
fn count_improvements(before: &[ExtractionItem], after: &[ExtractionItem]) -> usize {
    let mut improvements = before.len().saturating_sub(after.len());

    for refined in after {
        let title = refined.title().to_lowercase();
        let Some(original) = before.iter().find(|o| o.title().to_lowercase() == title) else {
            continue;
        };
        if refined.summary().len() >= original.summary().len() + SUMMARY_GROWTH_CHARS {
            improvements += 1;
        }
        if refined.entities().len() > original.entities().len() {
            improvements += 1;
        }
    }

    improvements
}
