//! Output validation - schema and grounding checks on extracted items.
//!
//! Every raw item passes through `validate` before it is accepted. The
//! checks run in a fixed order and short-circuit on schema failure; all
//! later findings accumulate into one `ValidationOutcome`. Validation
//! failures are a quality filter, not a pipeline failure: the controller
//! retries with corrective feedback and drops items that never pass.

use crate::types::chunk::Chunk;
use crate::types::item::{ConfidenceLevel, ExtractionItem};
use crate::types::transcript::SourceType;

/// Maximum title/topic length.
const MAX_TITLE_CHARS: usize = 200;

/// Maximum summary length.
const MAX_SUMMARY_CHARS: usize = 2000;

/// Minimum grounding excerpt length.
const MIN_EXCERPT_CHARS: usize = 10;

/// Significant-word overlap required for a non-verbatim excerpt.
const EXCERPT_OVERLAP_THRESHOLD: f64 = 0.7;

/// Fraction of an entity's words that must appear for a fuzzy match.
const ENTITY_WORD_THRESHOLD: f64 = 0.7;

/// The verdict on one item.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,

    /// Accumulated confidence adjustment in [-1, 1]
    pub confidence_adjustment: f64,

    /// Structural failure - the extraction call should be retried
    pub should_retry: bool,
}

impl ValidationOutcome {
    fn reject_schema(error: String) -> Self {
        Self {
            is_valid: false,
            errors: vec![error],
            warnings: Vec::new(),
            confidence_adjustment: -1.0,
            should_retry: true,
        }
    }

    fn error(&mut self, msg: impl Into<String>, adjustment: f64) {
        self.errors.push(msg.into());
        self.confidence_adjustment =
            (self.confidence_adjustment + adjustment).clamp(-1.0, 1.0);
    }

    fn warn(&mut self, msg: impl Into<String>, adjustment: f64) {
        self.warnings.push(msg.into());
        self.confidence_adjustment =
            (self.confidence_adjustment + adjustment).clamp(-1.0, 1.0);
    }
}

/// Validate one item against its source chunk.
pub fn validate(item: &ExtractionItem, chunk: &Chunk, source_type: SourceType) -> ValidationOutcome {
    // 1. Structural/schema checks, short-circuiting
    if let Some(schema_error) = schema_check(item, source_type) {
        return ValidationOutcome::reject_schema(schema_error);
    }

    let mut outcome = ValidationOutcome {
        is_valid: true,
        ..Default::default()
    };

    let base = item.base();
    let excerpt = base.grounding_excerpt.as_str();

    // 2. Grounding excerpt presence and minimum length
    if excerpt.trim().is_empty() {
        outcome.error("grounding excerpt is missing", -0.5);
        outcome.should_retry = true;
    } else if excerpt.trim().len() < MIN_EXCERPT_CHARS {
        outcome.error(
            format!("grounding excerpt too short ({} chars)", excerpt.trim().len()),
            -0.3,
        );
    }

    // 3. Entity verification against excerpt, then full chunk
    for entity in item.entities() {
        if fuzzy_match(entity, excerpt) {
            continue;
        }
        if fuzzy_match(entity, &chunk.text) {
            outcome.warn(
                format!("entity '{entity}' not in excerpt (found elsewhere in chunk)"),
                -0.05,
            );
        } else {
            outcome.error(format!("entity '{entity}' found nowhere in chunk"), -0.2);
        }
    }

    // 4. Excerpt-in-transcript check: verbatim, or >=70% significant-word
    //    overlap - anything less is likely fabrication
    if !excerpt.trim().is_empty() && !excerpt_grounded(excerpt, &chunk.text) {
        outcome.error("grounding excerpt not found in chunk text (likely fabrication)", -0.5);
    }

    // 5. Timestamp-in-chunk-range (warning only)
    if let Some(ts) = base.timestamp {
        if !chunk.contains_timestamp(ts) {
            outcome.warn(format!("timestamp {ts:.0}s outside chunk time range"), -0.05);
        }
    }

    // 6. Length-bound sanity checks
    if item.title().len() > MAX_TITLE_CHARS {
        outcome.warn("title exceeds length bound", -0.05);
    }
    if item.summary().len() > MAX_SUMMARY_CHARS {
        outcome.warn("summary exceeds length bound", -0.05);
    }

    // 7. Relevance/confidence cross-check
    if base.relevance_score >= 9 && base.confidence == ConfidenceLevel::Low {
        outcome.warn("relevance 9-10 contradicts low confidence", -0.1);
    }
    if base.relevance_score <= 2 {
        outcome.warn("relevance <=2 suggests the item should be dropped", -0.3);
    }

    outcome.is_valid = outcome.errors.is_empty();
    outcome
}

/// Field presence/type/length checks. Returns the first violation.
fn schema_check(item: &ExtractionItem, source_type: SourceType) -> Option<String> {
    if item.title().trim().is_empty() {
        return Some("title/topic is empty".into());
    }
    if item.summary().trim().is_empty() {
        return Some("summary is empty".into());
    }
    let relevance = item.base().relevance_score;
    if !(1..=10).contains(&relevance) {
        return Some(format!("relevance_score {relevance} out of range"));
    }

    // 8. Type-specific structural rules
    match (item, source_type) {
        (ExtractionItem::Debate(debate), _) => {
            if debate.positions.is_empty() {
                return Some("debate item has no positions".into());
            }
        }
        (ExtractionItem::News(_), SourceType::News) => {}
        (ExtractionItem::Dev(_), SourceType::Dev) => {}
        (_, expected) => {
            let kind = match item {
                ExtractionItem::News(_) => "news",
                ExtractionItem::Debate(_) => "debate",
                ExtractionItem::Dev(_) => "dev",
            };
            if kind != expected.as_str() {
                return Some(format!(
                    "item kind '{kind}' does not match source type '{}'",
                    expected.as_str()
                ));
            }
        }
    }

    None
}

/// Words longer than 3 characters, lowercased.
pub fn significant_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Whether an excerpt is grounded in the source text: verbatim substring,
/// or at least 70% of its significant words present.
pub fn excerpt_grounded(excerpt: &str, source: &str) -> bool {
    let excerpt = excerpt.trim();
    if source.contains(excerpt) {
        return true;
    }

    let words = significant_words(excerpt);
    if words.is_empty() {
        return false;
    }

    let source_lower = source.to_lowercase();
    let found = words.iter().filter(|w| source_lower.contains(w.as_str())).count();
    found as f64 / words.len() as f64 >= EXCERPT_OVERLAP_THRESHOLD
}

/// Fuzzy entity match: exact (case-insensitive), space/hyphen-normalized,
/// or 70% of the entity's words present in the text.
pub fn fuzzy_match(entity: &str, text: &str) -> bool {
    if entity.trim().is_empty() || text.is_empty() {
        return false;
    }

    let entity_lower = entity.to_lowercase();
    let text_lower = text.to_lowercase();

    if text_lower.contains(&entity_lower) {
        return true;
    }

    // Normalize spaces and hyphens away: "deep mind" matches "DeepMind"
    let strip = |s: &str| s.replace([' ', '-'], "");
    if strip(&text_lower).contains(&strip(&entity_lower)) {
        return true;
    }

    let words: Vec<&str> = entity_lower.split_whitespace().collect();
    if words.len() < 2 {
        return false;
    }
    let found = words.iter().filter(|w| text_lower.contains(*w)).count();
    found as f64 / words.len() as f64 >= ENTITY_WORD_THRESHOLD
}
