//! Transcript segmentation into token-bounded, topic-coherent chunks.
//!
//! Topic boundaries are detected from three independent signals:
//! embedding similarity drops between consecutive segments, lexical
//! transition markers at segment start, and silence gaps between segment
//! timestamps. Signals landing on the same index are merged with a
//! confidence boost. Chunks are then built greedily against the token
//! budget, with a configurable overlap carried into each new chunk.
//!
//! Transcripts without timing metadata fall back to fixed-size word
//! chunking.

use tracing::debug;

use crate::error::Result;
use crate::traits::provider::{cosine_similarity, Embedder};
use crate::types::chunk::{BoundaryType, Chunk};
use crate::types::config::{ChunkOptions, OverlapStrategy};
use crate::types::transcript::{Transcript, TranscriptSegment};

/// Silence this long (seconds) marks a soft topic boundary.
const SILENCE_SOFT_SECS: f64 = 3.0;

/// Silence this long marks a hard boundary.
const SILENCE_HARD_SECS: f64 = 5.0;

/// Fixed confidence for lexical transition markers.
const LEXICAL_CONFIDENCE: f64 = 0.6;

/// Confidence boost when multiple signals agree on an index.
const MULTI_SIGNAL_BOOST: f64 = 0.3;

/// A soft boundary closes a chunk only past this fraction of max_tokens.
const SOFT_CLOSE_FRACTION: f64 = 0.6;

/// Phrases that open a new topic in spoken-word content.
const TRANSITION_MARKERS: &[&str] = &[
    "now",
    "next",
    "moving on",
    "let's talk about",
    "speaking of",
    "anyway",
    "okay so",
    "turning to",
    "meanwhile",
    "finally",
    "one more thing",
];

/// A detected topic boundary before segment `index`.
#[derive(Debug, Clone)]
struct Boundary {
    index: usize,
    confidence: f64,
    hard: bool,
    signals: u8,
}

/// Splits transcripts into chunks. Holds an optional embedder for the
/// similarity signal; without one, the lexical and silence signals still
/// apply.
pub struct Chunker<'a> {
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> Chunker<'a> {
    pub fn new() -> Self {
        Self { embedder: None }
    }

    pub fn with_embedder(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder: Some(embedder),
        }
    }

    /// Segment a transcript into chunks.
    pub async fn segment(
        &self,
        transcript: &Transcript,
        options: &ChunkOptions,
    ) -> Result<Vec<Chunk>> {
        if !transcript.has_timing() {
            debug!(video_id = %transcript.video_id, "no timing metadata, word-chunking fallback");
            return Ok(word_chunk_fallback(&transcript.text, options));
        }

        let segments = &transcript.segments;
        let offsets = segment_offsets(segments);
        let boundaries = self.detect_boundaries(segments, options).await?;

        let chunks = build_chunks(segments, &offsets, &boundaries, options);
        debug!(
            video_id = %transcript.video_id,
            chunks = chunks.len(),
            boundaries = boundaries.len(),
            "transcript segmented"
        );
        Ok(chunks)
    }

    async fn detect_boundaries(
        &self,
        segments: &[TranscriptSegment],
        options: &ChunkOptions,
    ) -> Result<Vec<Boundary>> {
        let mut boundaries: Vec<Boundary> = Vec::new();

        // Signal (a): embedding similarity drop between consecutive segments
        if let Some(embedder) = self.embedder {
            let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
            let embeddings = embedder.embed_batch(&texts).await?;
            for i in 1..segments.len() {
                let sim = cosine_similarity(&embeddings[i - 1], &embeddings[i]);
                if sim < options.similarity_threshold {
                    boundaries.push(Boundary {
                        index: i,
                        confidence: 1.0 - sim,
                        hard: false,
                        signals: 1,
                    });
                }
            }
        }

        // Signal (b): lexical transition markers at segment start
        for (i, segment) in segments.iter().enumerate().skip(1) {
            let head = segment.text.trim_start().to_lowercase();
            if TRANSITION_MARKERS.iter().any(|m| head.starts_with(m)) {
                merge_boundary(
                    &mut boundaries,
                    Boundary {
                        index: i,
                        confidence: LEXICAL_CONFIDENCE,
                        hard: false,
                        signals: 1,
                    },
                );
            }
        }

        // Signal (c): silence gaps between segment timestamps
        for i in 1..segments.len() {
            let gap = segments[i].start - segments[i - 1].end;
            if gap >= SILENCE_SOFT_SECS {
                let confidence = (gap / SILENCE_HARD_SECS).min(1.0);
                merge_boundary(
                    &mut boundaries,
                    Boundary {
                        index: i,
                        confidence,
                        hard: gap >= SILENCE_HARD_SECS,
                        signals: 1,
                    },
                );
            }
        }

        boundaries.sort_by_key(|b| b.index);
        Ok(boundaries)
    }
}

impl Default for Chunker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge a boundary into the list: same index ⇒ take the max confidence,
/// boosted 30% (capped at 1.0), keep hardness, bump the signal count.
fn merge_boundary(boundaries: &mut Vec<Boundary>, new: Boundary) {
    if let Some(existing) = boundaries.iter_mut().find(|b| b.index == new.index) {
        existing.confidence = (existing.confidence.max(new.confidence)
            * (1.0 + MULTI_SIGNAL_BOOST))
            .min(1.0);
        existing.hard = existing.hard || new.hard;
        existing.signals += new.signals;
    } else {
        boundaries.push(new);
    }
}

/// Character offset of each segment in the joined transcript text
/// (segments joined with a single space).
fn segment_offsets(segments: &[TranscriptSegment]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(segments.len());
    let mut pos = 0usize;
    for segment in segments {
        offsets.push(pos);
        pos += segment.text.len() + 1;
    }
    offsets
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn estimate_tokens(words: usize) -> usize {
    words * 4 / 3
}

/// Greedy chunk construction over segments and detected boundaries.
fn build_chunks(
    segments: &[TranscriptSegment],
    offsets: &[usize],
    boundaries: &[Boundary],
    options: &ChunkOptions,
) -> Vec<Chunk> {
    let boundary_at = |index: usize| boundaries.iter().find(|b| b.index == index);

    let mut chunks = Vec::new();
    let mut start = 0usize; // first segment of the current chunk
    let mut words = 0usize;

    let mut i = 0usize;
    while i < segments.len() {
        words += word_count(&segments[i].text);
        let tokens = estimate_tokens(words);

        let mut close: Option<(BoundaryType, f64)> = None;
        if let Some(boundary) = boundary_at(i + 1) {
            if boundary.hard && tokens > options.min_tokens {
                close = Some((BoundaryType::Hard, boundary.confidence));
            } else if !boundary.hard
                && tokens as f64 > SOFT_CLOSE_FRACTION * options.max_tokens as f64
            {
                close = Some((BoundaryType::Soft, boundary.confidence));
            }
        }
        if close.is_none() && tokens > options.max_tokens {
            close = Some((BoundaryType::SizeLimit, 0.0));
        }

        let is_last = i + 1 == segments.len();
        if is_last && close.is_none() {
            close = Some((BoundaryType::End, 1.0));
        }

        if let Some((boundary_type, boundary_confidence)) = close {
            chunks.push(make_chunk(
                segments,
                offsets,
                start,
                i,
                boundary_type,
                boundary_confidence,
                options,
            ));

            if !is_last {
                start = overlap_start(segments, start, i, boundary_type, options);
                words = segments[start..=i]
                    .iter()
                    .map(|s| word_count(&s.text))
                    .sum();
            }
        }

        i += 1;
    }

    chunks
}

/// First segment of the next chunk, per the overlap strategy. The returned
/// index is within the closed chunk `[chunk_start, chunk_end]`; segments
/// from it onward are re-included.
fn overlap_start(
    segments: &[TranscriptSegment],
    chunk_start: usize,
    chunk_end: usize,
    boundary_type: BoundaryType,
    options: &ChunkOptions,
) -> usize {
    let len = chunk_end - chunk_start + 1;

    let fraction = match options.overlap_strategy {
        OverlapStrategy::Fixed => 0.10,
        OverlapStrategy::Adaptive => match boundary_type {
            // Topic changed; carrying much of the old topic adds noise
            BoundaryType::Hard => 0.10,
            // Cut mid-topic; carry more context forward
            _ => 0.20,
        },
        OverlapStrategy::Semantic => {
            // Walk back to the most recent sentence terminator
            for idx in (chunk_start..=chunk_end).rev() {
                let text = segments[idx].text.trim_end();
                if text.ends_with('.') || text.ends_with('!') || text.ends_with('?') {
                    return (idx + 1).min(chunk_end + 1);
                }
            }
            return chunk_end + 1 - ((len as f64 * 0.10).ceil() as usize).max(1).min(len);
        }
    };

    let overlap = ((len as f64 * fraction).ceil() as usize).max(1).min(len);
    chunk_end + 1 - overlap
}

#[allow(clippy::too_many_arguments)]
fn make_chunk(
    segments: &[TranscriptSegment],
    offsets: &[usize],
    start: usize,
    end: usize,
    boundary_type: BoundaryType,
    boundary_confidence: f64,
    options: &ChunkOptions,
) -> Chunk {
    let slice = &segments[start..=end];
    let text = slice
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let words = word_count(&text);

    let start_offset = offsets[start];
    let end_offset = start_offset + text.len();
    let time_range = Some((slice[0].start, slice[slice.len() - 1].end));

    let has_topic_shift = matches!(boundary_type, BoundaryType::Hard | BoundaryType::Soft);
    let quality_score = quality_score(words, boundary_type, boundary_confidence, options);

    Chunk {
        text,
        start_offset,
        end_offset,
        word_count: words,
        has_topic_shift,
        boundary_type,
        quality_score,
        time_range,
    }
}

/// Composite quality score: topic completeness, size-optimality and
/// boundary clarity, equally weighted. Diagnostic only.
fn quality_score(
    words: usize,
    boundary_type: BoundaryType,
    boundary_confidence: f64,
    options: &ChunkOptions,
) -> f64 {
    let completeness = match boundary_type {
        BoundaryType::Hard | BoundaryType::End => 1.0,
        BoundaryType::Soft => 0.8,
        BoundaryType::SizeLimit => 0.4,
    };

    let tokens = estimate_tokens(words) as f64;
    let target = (options.min_tokens + options.max_tokens) as f64 / 2.0;
    let size_optimality = (1.0 - (tokens - target).abs() / target).clamp(0.0, 1.0);

    let clarity = boundary_confidence.clamp(0.0, 1.0);

    (completeness + size_optimality + clarity) / 3.0
}

/// Fixed-size word chunking for untimed transcripts. Chunks carry a 10%
/// word overlap; time ranges are absent.
fn word_chunk_fallback(text: &str, options: &ChunkOptions) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let chunk_words = (options.max_tokens * 3 / 4).max(1);
    let overlap = (chunk_words / 10).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < words.len() {
        let end = (start + chunk_words).min(words.len());
        let slice = &words[start..end];
        let chunk_text = slice.join(" ");
        let at_end = end == words.len();

        // Approximate offsets from word positions
        let start_offset: usize = words[..start].iter().map(|w| w.len() + 1).sum();

        chunks.push(Chunk {
            end_offset: start_offset + chunk_text.len(),
            start_offset,
            word_count: slice.len(),
            has_topic_shift: false,
            boundary_type: if at_end {
                BoundaryType::End
            } else {
                BoundaryType::SizeLimit
            },
            quality_score: 0.5,
            time_range: None,
            text: chunk_text,
        });

        if at_end {
            break;
        }
        start = end - overlap;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEmbedder;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start, end, text)
    }

    fn timed_transcript(segments: Vec<TranscriptSegment>) -> Transcript {
        Transcript::from_segments("vid", segments)
    }

    #[tokio::test]
    async fn test_silence_gap_creates_hard_boundary() {
        // Enough words per segment that min_tokens (set low) is exceeded
        let filler = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do ".repeat(5);
        let transcript = timed_transcript(vec![
            seg(0.0, 10.0, &filler),
            seg(16.0, 26.0, &filler), // 6s silence before this one
            seg(26.5, 36.0, &filler),
        ]);

        let options = ChunkOptions::new().with_min_tokens(10).with_max_tokens(5000);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].boundary_type, BoundaryType::Hard);
        assert!(chunks[0].has_topic_shift);
        assert_eq!(chunks[1].boundary_type, BoundaryType::End);
    }

    #[tokio::test]
    async fn test_hard_boundary_respects_min_tokens() {
        let transcript = timed_transcript(vec![
            seg(0.0, 1.0, "short"),
            seg(10.0, 11.0, "also short"), // 9s gap, but chunk far below min_tokens
            seg(11.5, 12.0, "tail"),
        ]);

        let options = ChunkOptions::new().with_min_tokens(500).with_max_tokens(5000);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();

        // Never closed early; single chunk to the end
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].boundary_type, BoundaryType::End);
    }

    #[tokio::test]
    async fn test_soft_boundary_needs_sixty_percent_fill() {
        let filler = "word ".repeat(100); // ~133 estimated tokens per segment
        let transcript = timed_transcript(vec![
            seg(0.0, 10.0, &filler),
            seg(10.2, 20.0, &format!("moving on {filler}")), // lexical soft boundary
            seg(20.2, 30.0, &filler),
        ]);

        // max_tokens huge: 60% fill never reached, soft boundary ignored
        let options = ChunkOptions::new().with_min_tokens(10).with_max_tokens(100_000);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();
        assert_eq!(chunks.len(), 1);

        // max_tokens small enough that segment 1 passes the 60% mark
        let options = ChunkOptions::new().with_min_tokens(10).with_max_tokens(200);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].boundary_type, BoundaryType::Soft);
    }

    #[tokio::test]
    async fn test_max_tokens_forces_size_limit_split() {
        let filler = "word ".repeat(200);
        let transcript = timed_transcript(vec![
            seg(0.0, 10.0, &filler),
            seg(10.1, 20.0, &filler),
            seg(20.1, 30.0, &filler),
        ]);

        let options = ChunkOptions::new().with_min_tokens(10).with_max_tokens(250);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();

        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].boundary_type, BoundaryType::SizeLimit);
        assert!(!chunks[0].has_topic_shift);
    }

    #[tokio::test]
    async fn test_embedding_signal_boundaries() {
        // MockEmbedder returns orthogonal vectors for different texts, so
        // every consecutive pair falls below the threshold
        let embedder = MockEmbedder::orthogonal();
        let filler_a = format!("alpha {}", "word ".repeat(120));
        let filler_b = format!("beta {}", "term ".repeat(120));

        let transcript = timed_transcript(vec![
            seg(0.0, 10.0, &filler_a),
            seg(10.1, 20.0, &filler_b),
        ]);

        let options = ChunkOptions::new()
            .with_min_tokens(10)
            .with_max_tokens(220)
            .with_similarity_threshold(0.5);
        let chunker = Chunker::with_embedder(&embedder);
        let chunks = chunker.segment(&transcript, &options).await.unwrap();

        // Similarity drop alone is a candidate (soft) boundary; segment 0
        // exceeds 60% of max_tokens, so it closes there
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].boundary_type, BoundaryType::Soft);
    }

    #[test]
    fn test_multi_signal_merge_boosts_confidence() {
        let mut boundaries = vec![Boundary {
            index: 3,
            confidence: 0.6,
            hard: false,
            signals: 1,
        }];
        merge_boundary(
            &mut boundaries,
            Boundary {
                index: 3,
                confidence: 0.5,
                hard: true,
                signals: 1,
            },
        );

        assert_eq!(boundaries.len(), 1);
        let b = &boundaries[0];
        assert_eq!(b.signals, 2);
        assert!(b.hard);
        assert!((b.confidence - 0.78).abs() < 1e-9); // 0.6 * 1.3

        // Boost caps at 1.0
        merge_boundary(
            &mut boundaries,
            Boundary {
                index: 3,
                confidence: 0.95,
                hard: false,
                signals: 1,
            },
        );
        assert!(boundaries[0].confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_untimed_fallback_word_chunking() {
        let text = "word ".repeat(500);
        let transcript = Transcript::from_text("vid", text.trim());

        let options = ChunkOptions::new().with_max_tokens(200);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.time_range.is_none()));
        assert_eq!(chunks.last().unwrap().boundary_type, BoundaryType::End);
        // 10% overlap between consecutive chunks
        assert!(chunks[0].word_count <= 200 * 3 / 4);
    }

    #[tokio::test]
    async fn test_quality_score_bounds_and_offsets() {
        let filler = "steady topic words here ".repeat(30);
        let transcript = timed_transcript(vec![
            seg(0.0, 10.0, &filler),
            seg(16.0, 26.0, &filler),
        ]);

        let options = ChunkOptions::new().with_min_tokens(10).with_max_tokens(400);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();

        for chunk in &chunks {
            assert!((0.0..=1.0).contains(&chunk.quality_score));
            assert!(chunk.end_offset > chunk.start_offset);
            // Chunk text matches the transcript slice at its offsets
            assert_eq!(
                &transcript.text[chunk.start_offset..chunk.end_offset],
                chunk.text
            );
        }
    }

    #[tokio::test]
    async fn test_semantic_overlap_rewinds_to_sentence_end() {
        let many = "filler words to fill the budget ".repeat(20);
        let transcript = timed_transcript(vec![
            seg(0.0, 5.0, &format!("{many} This sentence ends here.")),
            seg(5.1, 10.0, &many),
            seg(10.1, 15.0, &many),
        ]);

        let options = ChunkOptions::new()
            .with_min_tokens(10)
            .with_max_tokens(300)
            .with_overlap_strategy(OverlapStrategy::Semantic);
        let chunks = Chunker::new().segment(&transcript, &options).await.unwrap();

        assert!(chunks.len() >= 2);
        // Second chunk starts after the terminated sentence, not inside it
        assert!(chunks[1].text.starts_with(many.trim_start_matches(' ').split(' ').next().unwrap()));
    }
}
