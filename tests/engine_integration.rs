//! End-to-end pipeline tests over scripted providers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use transcript_extract::pipeline::{merge_items, run_passes, PassContext};
use transcript_extract::providers::ProviderId;
use transcript_extract::testing::MockProvider;
use transcript_extract::traits::QuotaGate;
use transcript_extract::types::item::{ItemBase, NewsItem};
use transcript_extract::validate::excerpt_grounded;
use transcript_extract::{
    ConfidenceLevel, ConsensusConfig, CostAccumulator, Engine, EngineConfig, ExtractionError,
    ExtractionItem, PassConfig, Provider, Result, SourceType, Transcript, VideoMetadata,
};

const TRANSCRIPT: &str = "OpenAI announced GPT-X today with 100K context. \
     Mozilla shipped Firefox this week. Gemini got a preview update too.";

fn transcript() -> Transcript {
    Transcript::from_text("vid1", TRANSCRIPT)
}

fn meta() -> VideoMetadata {
    VideoMetadata::new("Weekly News", "Channel", "chan1", "https://example.com/v")
}

fn gpt_item(context_window: &str) -> String {
    format!(
        r#"{{"kind":"news","title":"GPT-X announced","summary":"OpenAI announced GPT-X today with {context_window} context.","entities":["OpenAI","GPT-X"],"grounding_excerpt":"OpenAI announced GPT-X today with {context_window} context","confidence":"high","relevance_score":9}}"#
    )
}

fn firefox_item(confidence: &str) -> String {
    format!(
        r#"{{"kind":"news","title":"Firefox release","summary":"Mozilla shipped a new Firefox release to users this week.","entities":["Mozilla"],"grounding_excerpt":"Mozilla shipped Firefox this week","confidence":"{confidence}","relevance_score":7}}"#
    )
}

fn fabricated_item() -> String {
    r#"{"kind":"news","title":"Quantum leap","summary":"Researchers unveiled a quantum processor with record qubit counts.","entities":[],"grounding_excerpt":"researchers unveiled a quantum processor","confidence":"high","relevance_score":8}"#.to_string()
}

fn envelope(items: &[String]) -> String {
    format!(r#"{{"items":[{}],"confidence":0.9}}"#, items.join(","))
}

fn single_pass_config() -> EngineConfig {
    EngineConfig {
        passes: PassConfig {
            max_retries: 0,
            ..PassConfig::single_pass()
        },
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn grounded_items_survive_end_to_end() {
    let provider = MockProvider::new("mock")
        .with_response(envelope(&[gpt_item("100K"), fabricated_item()]))
        .with_usage(500, 80)
        .with_cost_per_call(0.004);
    let engine = Engine::new(single_pass_config(), Arc::new(provider));

    let result = engine
        .process_video(&transcript(), &meta(), SourceType::News)
        .await
        .unwrap();

    // The fabricated item was dropped; the grounded one survived
    assert_eq!(result.total_items, 1);
    assert_eq!(result.items[0].title(), "GPT-X announced");
    for item in &result.items {
        assert!(excerpt_grounded(&item.base().grounding_excerpt, TRANSCRIPT));
    }
    assert_eq!(result.tokens_used, 580);
    assert!((result.estimated_cost_usd - 0.004).abs() < 1e-9);
    assert_eq!(result.multi_pass.as_ref().unwrap().pass1_items, 1);
    assert!(result.consensus.is_none());
}

#[tokio::test]
async fn audit_rejects_tampered_figures() {
    // The transcript says 100K; the model claims 200K. The excerpt still
    // shares enough words to pass grounding, so only the audit catches it.
    let provider = MockProvider::new("mock")
        .with_response(envelope(&[gpt_item("200K"), firefox_item("high")]));
    let config = EngineConfig {
        hallucination_audit: true,
        ..single_pass_config()
    };
    let engine = Engine::new(config, Arc::new(provider));

    let result = engine
        .process_video(&transcript(), &meta(), SourceType::News)
        .await
        .unwrap();

    assert_eq!(result.total_items, 1);
    assert_eq!(result.items[0].title(), "Firefox release");
}

struct ExhaustedBudget;

#[async_trait]
impl QuotaGate for ExhaustedBudget {
    async fn check(&self, _video_id: &str) -> Result<()> {
        Err(ExtractionError::QuotaExceeded("0 minutes left".into()))
    }
}

#[tokio::test]
async fn quota_gate_blocks_before_any_call() {
    let provider = MockProvider::new("mock").with_response(envelope(&[firefox_item("high")]));
    let calls = provider.clone();
    let engine = Engine::new(single_pass_config(), Arc::new(provider))
        .with_quota_gate(Arc::new(ExhaustedBudget));

    let err = engine
        .process_video(&transcript(), &meta(), SourceType::News)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractionError::QuotaExceeded(_)));
    assert_eq!(calls.call_count(), 0);
}

#[tokio::test]
async fn cancellation_aborts_processing() {
    let provider = MockProvider::new("slow")
        .with_response(envelope(&[firefox_item("high")]))
        .with_delay_ms(500);
    let engine = Engine::new(single_pass_config(), Arc::new(provider));

    let token = CancellationToken::new();
    token.cancel();

    let err = engine
        .process_with_cancel(&transcript(), &meta(), SourceType::News, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::Cancelled));
}

#[tokio::test]
async fn empty_transcript_is_rejected() {
    let provider = MockProvider::new("mock");
    let engine = Engine::new(single_pass_config(), Arc::new(provider));

    let err = engine
        .process_video(&Transcript::from_text("vid1", "   "), &meta(), SourceType::News)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::InvalidInput { .. }));
}

#[tokio::test]
async fn hierarchical_consensus_confirms_uncertain_items() {
    // Tier-1 is unsure about the Firefox item, tier-2 agrees at the same
    // confidence, so the item settles without conflict and never sinks
    // below where tier-1 put it
    let tier1 = MockProvider::new("openai-mini")
        .with_response(envelope(&[firefox_item("medium")]));
    let tier2 = MockProvider::new("openai").with_response(envelope(&[firefox_item("medium")]));

    let mut providers: HashMap<ProviderId, Arc<dyn Provider>> = HashMap::new();
    providers.insert(ProviderId::OpenAiMini, Arc::new(tier1));
    providers.insert(ProviderId::OpenAi, Arc::new(tier2));

    let config = EngineConfig {
        consensus: Some(ConsensusConfig::hierarchical(
            ProviderId::OpenAiMini,
            ProviderId::OpenAi,
        )),
        ..single_pass_config()
    };
    let unused = MockProvider::new("unused");
    let unused_calls = unused.clone();
    let engine = Engine::new(config, Arc::new(unused))
        .with_consensus_providers(providers)
        .unwrap();

    let result = engine
        .process_video(&transcript(), &meta(), SourceType::News)
        .await
        .unwrap();

    assert_eq!(result.total_items, 1);
    assert!(result.items[0].base().confidence >= ConfidenceLevel::Medium);
    let consensus = result.consensus.unwrap();
    assert_eq!(consensus.tier2_items, 1);
    assert_eq!(consensus.conflicts_resolved, 0);
    // The consensus path never touches the fallback provider
    assert_eq!(unused_calls.call_count(), 0);
}

#[tokio::test]
async fn ensemble_requires_minimum_agreement() {
    let a = MockProvider::new("openai-mini")
        .with_response(envelope(&[firefox_item("high"), gpt_item("100K")]));
    let b = MockProvider::new("openai").with_response(envelope(&[firefox_item("medium")]));

    let mut providers: HashMap<ProviderId, Arc<dyn Provider>> = HashMap::new();
    providers.insert(ProviderId::OpenAiMini, Arc::new(a));
    providers.insert(ProviderId::OpenAi, Arc::new(b));

    let config = EngineConfig {
        consensus: Some(ConsensusConfig::ensemble(
            vec![ProviderId::OpenAiMini, ProviderId::OpenAi],
            2,
        )),
        ..single_pass_config()
    };
    let engine = Engine::new(config, Arc::new(MockProvider::new("unused")))
        .with_consensus_providers(providers)
        .unwrap();

    let result = engine
        .process_video(&transcript(), &meta(), SourceType::News)
        .await
        .unwrap();

    // Only the item both providers produced survives
    assert_eq!(result.total_items, 1);
    assert_eq!(result.items[0].title(), "Firefox release");
}

#[tokio::test]
async fn stream_yields_items_per_chunk() {
    let provider = MockProvider::new("mock").with_response(envelope(&[firefox_item("high")]));
    let engine = Engine::new(single_pass_config(), Arc::new(provider));

    let transcript = transcript();
    let meta = meta();
    let stream = engine.process_stream(&transcript, &meta, SourceType::News);
    futures::pin_mut!(stream);

    let mut batches = Vec::new();
    while let Some(batch) = stream.next().await {
        batches.push(batch.unwrap());
    }

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
}

/// Pass 3 trusts the model to decide which items describe the same event;
/// there is no local similarity check. Two distinct items come back merged
/// and the controller accepts it because the list shrank.
#[tokio::test]
async fn refinement_merges_are_model_judged() {
    let merged = r#"{"kind":"news","title":"The week in browsers and models","summary":"Mozilla shipped Firefox this week and Gemini got a preview update.","entities":["Mozilla","Gemini"],"grounding_excerpt":"Mozilla shipped Firefox this week","confidence":"medium","relevance_score":7}"#;
    let gemini = r#"{"kind":"news","title":"Gemini preview","summary":"Gemini got a preview update according to the hosts.","entities":["Gemini"],"grounding_excerpt":"Gemini got a preview update too","confidence":"medium","relevance_score":6}"#;
    let provider = MockProvider::new("mock")
        .with_response(envelope(&[firefox_item("medium"), gemini.to_string()]))
        .with_response(format!(r#"{{"items":[{merged}],"confidence":0.9}}"#));

    let config = PassConfig {
        enable_refinement: true,
        ..PassConfig::single_pass()
    };
    let meta = meta();
    let chunk = transcript_extract::Chunk {
        text: TRANSCRIPT.to_string(),
        start_offset: 0,
        end_offset: TRANSCRIPT.len(),
        word_count: TRANSCRIPT.split_whitespace().count(),
        has_topic_shift: false,
        boundary_type: transcript_extract::BoundaryType::End,
        quality_score: 0.8,
        time_range: None,
    };
    let ctx = PassContext {
        provider: &provider,
        source_type: SourceType::News,
        video_id: "vid1",
        meta: &meta,
        config: &config,
        timeout: Duration::from_secs(5),
    };
    let mut acc = CostAccumulator::new();

    let outcome = run_passes(&ctx, &chunk, &mut acc).await;
    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.items[0].title(), "The week in browsers and models");
}

fn arbitrary_item(title: String, summary: String, relevance: u8) -> ExtractionItem {
    ExtractionItem::News(NewsItem {
        base: ItemBase::new("v", "c", "u").with_relevance(relevance.max(1)),
        title,
        summary,
        entities: vec![],
    })
}

proptest! {
    #[test]
    fn merge_is_idempotent(
        titles in proptest::collection::vec("[a-d]{1,4}", 0..12),
        relevances in proptest::collection::vec(1u8..=10, 0..12),
    ) {
        let items: Vec<ExtractionItem> = titles
            .iter()
            .zip(relevances.iter().chain(std::iter::repeat(&5)))
            .map(|(t, r)| arbitrary_item(t.clone(), format!("summary of {t}"), *r))
            .collect();

        let once = merge_items(items);
        let twice = merge_items(once.clone());

        prop_assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }
}
