//! The extraction pipeline: prompts, response parsing, gap analysis,
//! the multi-pass controller, cross-chunk merging, and the engine that
//! orchestrates it all per video.

pub mod call;
pub mod engine;
pub mod gaps;
pub mod merge;
pub mod parse;
pub mod passes;
pub mod prompts;

pub use engine::Engine;
pub use gaps::{analyze_gaps, GapAnalysis};
pub use merge::merge_items;
pub use passes::{run_passes, ChunkOutcome, PassContext};
