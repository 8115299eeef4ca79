//! Chunk types - the unit of work for extraction passes.

use serde::{Deserialize, Serialize};

/// What ended the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    /// A hard topic boundary (long silence, or strong multi-signal shift)
    Hard,

    /// A soft boundary (lexical transition marker, moderate similarity drop)
    Soft,

    /// The token budget was exhausted mid-topic
    SizeLimit,

    /// End of the transcript
    End,
}

/// A token-bounded, topic-coherent slice of a transcript.
///
/// Immutable once built; consumed exactly once by the pass controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text, including any overlap carried from the previous chunk
    pub text: String,

    /// Character offset of the chunk start in the full transcript text
    pub start_offset: usize,

    /// Character offset one past the chunk end
    pub end_offset: usize,

    /// Word count of `text`
    pub word_count: usize,

    /// Whether a detected topic shift ended this chunk
    pub has_topic_shift: bool,

    /// What terminated the chunk
    pub boundary_type: BoundaryType,

    /// Composite quality score in [0, 1] blending topic completeness,
    /// size-optimality and boundary clarity. Diagnostic only; never gates
    /// processing.
    pub quality_score: f64,

    /// Time span `(start, end)` in seconds, when timing metadata existed
    pub time_range: Option<(f64, f64)>,
}

impl Chunk {
    /// Estimated token count (~0.75 words per token for spoken English).
    pub fn estimated_tokens(&self) -> usize {
        self.word_count * 4 / 3
    }

    /// Duration of the chunk in seconds, if timed.
    pub fn duration(&self) -> Option<f64> {
        self.time_range.map(|(s, e)| e - s)
    }

    /// Whether a timestamp (seconds) falls inside this chunk's time range.
    pub fn contains_timestamp(&self, ts: f64) -> bool {
        match self.time_range {
            Some((start, end)) => ts >= start && ts <= end,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_range(range: Option<(f64, f64)>) -> Chunk {
        Chunk {
            text: "some words here".into(),
            start_offset: 0,
            end_offset: 15,
            word_count: 3,
            has_topic_shift: false,
            boundary_type: BoundaryType::End,
            quality_score: 0.5,
            time_range: range,
        }
    }

    #[test]
    fn test_estimated_tokens() {
        let c = chunk_with_range(None);
        assert_eq!(c.estimated_tokens(), 4);
    }

    #[test]
    fn test_contains_timestamp() {
        let c = chunk_with_range(Some((10.0, 20.0)));
        assert!(c.contains_timestamp(15.0));
        assert!(!c.contains_timestamp(25.0));

        // Untimed chunks accept any timestamp
        let c = chunk_with_range(None);
        assert!(c.contains_timestamp(999.0));
    }
}
