//! Transcript Extraction Engine
//!
//! Extracts structured, evidence-grounded items (news, debate positions,
//! developer updates) from LLM-processed video transcripts, with validation
//! and hallucination detection between the model and the output.
//!
//! # Design Philosophy
//!
//! **"Never trust a single completion"**
//!
//! - Every item must carry a grounding excerpt traceable to the source
//! - Extraction is multi-pass: broad, then gap-filling, then refinement
//! - Validation failures feed back into bounded retries
//! - Multiple providers can vote under a consensus strategy
//! - Per-call failures are absorbed and accounted, never fatal
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use transcript_extract::{Engine, EngineConfig, SourceType, Transcript, VideoMetadata};
//! use transcript_extract::providers::{ProviderFactory, ProviderId};
//!
//! let provider = ProviderFactory::new().resolve(ProviderId::OpenAiMini)?;
//! let engine = Engine::new(EngineConfig::default(), provider);
//!
//! let transcript = Transcript::from_text("vid123", "full transcript text...");
//! let meta = VideoMetadata::new("Title", "Channel", "chan1", "https://example.com/v");
//! let result = engine.process_video(&transcript, &meta, SourceType::News).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Provider, Embedder, QuotaGate)
//! - [`types`] - Transcript, chunk, item and configuration types
//! - [`chunker`] - Multi-signal topic-boundary segmentation
//! - [`pipeline`] - Prompts, parsing, multi-pass controller and the engine
//! - [`consensus`] - Hierarchical / ensemble / hybrid multi-provider voting
//! - [`validate`] - Schema and grounding validation
//! - [`hallucination`] - Entity, claim-support, semantic and detail audits
//! - [`providers`] - Provider implementations and the factory
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod chunker;
pub mod consensus;
pub mod error;
pub mod hallucination;
pub mod pipeline;
pub mod providers;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;
pub mod validate;

// Re-export core types at crate root
pub use chunker::Chunker;
pub use consensus::{ConsensusEngine, ConsensusOutcome, ConsensusRequest};
pub use error::{ExtractionError, Result};
pub use hallucination::{ConfidenceAdjustment, HallucinationCheck, HallucinationDetector};
pub use pipeline::Engine;
pub use traits::{Embedder, Provider, QuotaGate};
pub use types::chunk::{BoundaryType, Chunk};
pub use types::config::{
    BatchOptions, ChunkOptions, ConsensusConfig, ConsensusStrategy, EngineConfig, OverlapStrategy,
    PassConfig,
};
pub use types::consensus::{ItemConsensus, ProviderVote};
pub use types::item::{ConfidenceLevel, ExtractionItem};
pub use types::result::{
    ConsensusMetrics, CostAccumulator, MultiPassMetrics, TokenUsage, VideoExtractionResult,
};
pub use types::transcript::{SourceType, Transcript, TranscriptSegment, VideoMetadata};
pub use validate::{validate, ValidationOutcome};
