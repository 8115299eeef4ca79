//! Gap analysis between pass-1 output and the source chunk.
//!
//! Computed after the broad pass and consumed only by the gap-filling
//! pass. Three kinds of gap: uncovered time ranges, uncovered named
//! entities, and structural incompleteness in the items themselves.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::types::chunk::Chunk;
use crate::types::item::ExtractionItem;

/// An extracted-item gap in the chunk's time span counts from this length.
const TIME_GAP_SECS: f64 = 30.0;

/// Summaries shorter than this flag an incomplete pattern.
const MIN_SUMMARY_CHARS: usize = 40;

/// The diff between what pass 1 extracted and what the chunk plausibly
/// contains.
#[derive(Debug, Clone, Default)]
pub struct GapAnalysis {
    /// `(start, end)` spans of the chunk's time range no item covers
    pub uncovered_time_ranges: Vec<(f64, f64)>,

    /// Capitalized phrases in the chunk not claimed by any item
    pub uncovered_entities: Vec<String>,

    /// Structural completeness issues in pass-1 items
    pub incomplete_patterns: Vec<String>,

    pub should_run_gap_pass: bool,
}

impl GapAnalysis {
    pub fn is_empty(&self) -> bool {
        self.uncovered_time_ranges.is_empty()
            && self.uncovered_entities.is_empty()
            && self.incomplete_patterns.is_empty()
    }
}

/// Analyze what the broad pass missed in a chunk.
pub fn analyze_gaps(items: &[ExtractionItem], chunk: &Chunk) -> GapAnalysis {
    let uncovered_time_ranges = uncovered_time_ranges(items, chunk);
    let uncovered_entities = uncovered_entities(items, chunk);
    let incomplete_patterns = incomplete_patterns(items);

    let mut analysis = GapAnalysis {
        uncovered_time_ranges,
        uncovered_entities,
        incomplete_patterns,
        should_run_gap_pass: false,
    };
    analysis.should_run_gap_pass = !analysis.is_empty();
    analysis
}

/// Gaps ≥30s between items' timestamps and the chunk's full span.
fn uncovered_time_ranges(items: &[ExtractionItem], chunk: &Chunk) -> Vec<(f64, f64)> {
    let Some((chunk_start, chunk_end)) = chunk.time_range else {
        return Vec::new();
    };

    let mut stamps: Vec<f64> = items
        .iter()
        .filter_map(|i| i.base().timestamp)
        .filter(|ts| *ts >= chunk_start && *ts <= chunk_end)
        .collect();
    stamps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut gaps = Vec::new();
    let mut cursor = chunk_start;
    for ts in &stamps {
        if ts - cursor >= TIME_GAP_SECS {
            gaps.push((cursor, *ts));
        }
        cursor = *ts;
    }
    if chunk_end - cursor >= TIME_GAP_SECS {
        gaps.push((cursor, chunk_end));
    }
    gaps
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Capitalized word optionally followed by more capitalized words,
    // digits or hyphenated tails (e.g. "GPT-4 Turbo", "Red Hat")
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][a-zA-Z0-9]*(?:[-.][A-Za-z0-9]+)*(?:\s+[A-Z][a-zA-Z0-9]*(?:[-.][A-Za-z0-9]+)*)*").unwrap()
    })
}

/// Common sentence-initial words that match the capitalized pattern but
/// are never entities.
const ENTITY_STOPWORDS: &[&str] = &[
    "The", "This", "That", "These", "Those", "And", "But", "So", "Now", "Then", "There", "Here",
    "What", "When", "Where", "Which", "Who", "How", "Why", "If", "In", "On", "At", "As", "It",
    "We", "You", "They", "He", "She", "I", "My", "Our", "Your", "Okay", "Yes", "No", "Well",
    "Also", "Today", "First", "Second", "Next", "Finally",
];

/// Capitalized phrases extracted from the chunk text.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for m in entity_regex().find_iter(text) {
        let candidate = m.as_str().trim();
        if candidate.len() < 2 {
            continue;
        }
        // Single stopword matches are sentence-initial noise
        if ENTITY_STOPWORDS.contains(&candidate) {
            continue;
        }
        if seen.insert(candidate.to_lowercase()) {
            entities.push(candidate.to_string());
        }
    }
    entities
}

/// Entities present in the chunk but claimed by no item.
fn uncovered_entities(items: &[ExtractionItem], chunk: &Chunk) -> Vec<String> {
    let covered: HashSet<String> = items
        .iter()
        .flat_map(|i| i.entities().iter())
        .map(|e| e.to_lowercase())
        .collect();

    let covered_text: String = items
        .iter()
        .map(|i| format!("{} {}", i.title(), i.summary()))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    extract_entities(&chunk.text)
        .into_iter()
        .filter(|e| {
            let lower = e.to_lowercase();
            !covered.contains(&lower) && !covered_text.contains(&lower)
        })
        .collect()
}

/// Truncated sentences, under-length summaries, missing timestamps.
fn incomplete_patterns(items: &[ExtractionItem]) -> Vec<String> {
    let mut patterns = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let summary = item.summary().trim();
        if summary.len() < MIN_SUMMARY_CHARS {
            patterns.push(format!("item {} summary under-length", idx + 1));
        } else if !summary.ends_with(['.', '!', '?']) {
            patterns.push(format!("item {} summary looks truncated", idx + 1));
        }
        if item.base().timestamp.is_none() {
            patterns.push(format!("item {} missing timestamp", idx + 1));
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chunk::BoundaryType;
    use crate::types::item::{ItemBase, NewsItem};

    fn chunk(text: &str, range: Option<(f64, f64)>) -> Chunk {
        Chunk {
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            word_count: text.split_whitespace().count(),
            has_topic_shift: false,
            boundary_type: BoundaryType::End,
            quality_score: 0.8,
            time_range: range,
        }
    }

    fn item(summary: &str, entities: &[&str], timestamp: Option<f64>) -> ExtractionItem {
        let mut base = ItemBase::new("v", "c", "u");
        base.timestamp = timestamp;
        ExtractionItem::News(NewsItem {
            base,
            title: "Some headline".into(),
            summary: summary.into(),
            entities: entities.iter().map(|e| e.to_string()).collect(),
        })
    }

    #[test]
    fn test_uncovered_time_ranges() {
        let c = chunk("text", Some((0.0, 120.0)));
        let items = vec![
            item(
                "A complete and reasonably long summary sentence here.",
                &[],
                Some(10.0),
            ),
            item(
                "Another complete and reasonably long summary sentence.",
                &[],
                Some(20.0),
            ),
        ];

        let analysis = analyze_gaps(&items, &c);
        // 20s..120s is a 100s hole
        assert!(analysis
            .uncovered_time_ranges
            .iter()
            .any(|(s, e)| *s == 20.0 && *e == 120.0));
        assert!(analysis.should_run_gap_pass);
    }

    #[test]
    fn test_entity_extraction_skips_stopwords() {
        let entities =
            extract_entities("Now the team at Mozilla shipped Firefox Quantum. The update is big.");
        assert!(entities.iter().any(|e| e.contains("Mozilla")));
        assert!(entities.iter().any(|e| e.contains("Firefox Quantum")));
        assert!(!entities.iter().any(|e| e == "The"));
        assert!(!entities.iter().any(|e| e == "Now"));
    }

    #[test]
    fn test_uncovered_entities_respects_item_coverage() {
        let c = chunk(
            "Mozilla shipped Firefox today. Google answered with Chrome.",
            Some((0.0, 20.0)),
        );
        let items = vec![item(
            "Mozilla shipped a new Firefox release with performance fixes.",
            &["Mozilla", "Firefox"],
            Some(5.0),
        )];

        let analysis = analyze_gaps(&items, &c);
        assert!(analysis.uncovered_entities.iter().any(|e| e == "Google"));
        assert!(!analysis.uncovered_entities.iter().any(|e| e == "Mozilla"));
    }

    #[test]
    fn test_incomplete_patterns() {
        let items = vec![
            item("Too short", &[], Some(1.0)),
            item("A long enough summary that simply never terminates properly", &[], None),
        ];
        let patterns = incomplete_patterns(&items);

        assert!(patterns.iter().any(|p| p.contains("under-length")));
        assert!(patterns.iter().any(|p| p.contains("truncated")));
        assert!(patterns.iter().any(|p| p.contains("missing timestamp")));
    }

    #[test]
    fn test_no_gaps_no_pass() {
        let c = chunk("plain lowercase text only here.", Some((0.0, 20.0)));
        let items = vec![item(
            "A complete and reasonably long summary sentence right here.",
            &[],
            Some(10.0),
        )];
        let analysis = analyze_gaps(&items, &c);
        assert!(!analysis.should_run_gap_pass);
        assert!(analysis.is_empty());
    }
}
