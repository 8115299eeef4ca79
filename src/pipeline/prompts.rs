//! LLM prompts for the extraction passes.
//!
//! One instruction set per source type, plus the re-scoped gap-pass
//! prompt, the corrective-feedback retry prompt and the refinement prompt.

use crate::pipeline::gaps::GapAnalysis;
use crate::types::transcript::SourceType;

/// Shared grounding rules appended to every extraction prompt.
const GROUNDING_RULES: &str = r#"Rules:
- Every item MUST include a "grounding_excerpt": a verbatim quote from the
  transcript that supports the claim. Do not paraphrase the excerpt.
- Only extract what is explicitly said. Never invent names, numbers,
  versions or dates.
- "confidence" is one of "high", "medium", "low".
- "relevance_score" is an integer 1-10.
- "timestamp" is seconds from the start of the video when attributable,
  otherwise null.
Return a JSON object: {"items": [...], "confidence": 0.0-1.0}"#;

/// System prompt for the broad pass, per source type.
pub fn system_prompt(source_type: SourceType) -> String {
    let schema = match source_type {
        SourceType::News => {
            r#"You extract news facts from a spoken-word transcript chunk.
Each item: {"kind": "news", "title": "...", "summary": "...",
"entities": ["..."], "grounding_excerpt": "...", "confidence": "...",
"relevance_score": N, "timestamp": null}"#
        }
        SourceType::Debate => {
            r#"You extract debate topics and positions from a spoken-word transcript chunk.
Each item: {"kind": "debate", "topic": "...", "summary": "...",
"positions": [{"stance": "pro"|"contra"|"neutral", "holder": "...", "statement": "..."}],
"entities": ["..."], "grounding_excerpt": "...", "confidence": "...",
"relevance_score": N, "timestamp": null}
Every item needs at least one position."#
        }
        SourceType::Dev => {
            r#"You extract developer actions (releases, updates, announcements,
deprecations, tools) from a spoken-word transcript chunk.
Each item: {"kind": "dev", "title": "...", "summary": "...",
"action": "release"|"update"|"announcement"|"deprecation"|"tool",
"links": ["..."], "entities": ["..."], "grounding_excerpt": "...",
"confidence": "...", "relevance_score": N, "timestamp": null}
"links" is always present, possibly empty."#
        }
    };
    format!("{schema}\n\n{GROUNDING_RULES}")
}

/// User prompt for the broad pass.
pub fn broad_pass_prompt(chunk_text: &str) -> String {
    format!("Transcript chunk:\n{chunk_text}\n\nExtract all items.")
}

/// User prompt for the gap-filling pass, re-scoped to what pass 1 missed.
/// Asks for missed items only, never re-extraction of existing ones.
pub fn gap_pass_prompt(chunk_text: &str, gaps: &GapAnalysis, existing_titles: &[String]) -> String {
    let mut scope = String::new();

    if !gaps.uncovered_time_ranges.is_empty() {
        let ranges = gaps
            .uncovered_time_ranges
            .iter()
            .map(|(s, e)| format!("{s:.0}s-{e:.0}s"))
            .collect::<Vec<_>>()
            .join(", ");
        scope.push_str(&format!("Uncovered time ranges: {ranges}\n"));
    }

    if !gaps.uncovered_entities.is_empty() {
        scope.push_str(&format!(
            "Entities mentioned but not yet covered: {}\n",
            gaps.uncovered_entities.join(", ")
        ));
    }

    if !gaps.incomplete_patterns.is_empty() {
        scope.push_str(&format!(
            "Completeness issues in the first pass: {}\n",
            gaps.incomplete_patterns.join("; ")
        ));
    }

    let existing = if existing_titles.is_empty() {
        "(none)".to_string()
    } else {
        existing_titles.join("; ")
    };

    format!(
        "Transcript chunk:\n{chunk_text}\n\n\
         A first extraction pass already produced these items: {existing}\n\
         {scope}\
         Extract ONLY items missed by the first pass, focused on the \
         uncovered ranges and entities above. Do not repeat existing items."
    )
}

/// User prompt for the refinement pass: merge semantic duplicates and
/// enhance summaries strictly from existing source text.
pub fn refinement_prompt(chunk_text: &str, items_json: &str) -> String {
    format!(
        "Transcript chunk:\n{chunk_text}\n\n\
         Extracted items (JSON):\n{items_json}\n\n\
         Refine this item list:\n\
         - Merge items that describe the SAME event (semantic duplicates, \
           not merely similar topics).\n\
         - Expand summaries only with details already present in the \
           transcript chunk.\n\
         - Grow entity lists from the chunk text where warranted.\n\
         - NEVER introduce new items.\n\
         Return the full refined list in the same JSON shape."
    )
}

/// Retry prompt embedding the validator's findings as corrective feedback.
pub fn corrective_feedback_prompt(
    original_user_prompt: &str,
    errors: &[String],
    warnings: &[String],
) -> String {
    let mut feedback = String::new();
    if !errors.is_empty() {
        feedback.push_str("Errors in your previous attempt:\n");
        for e in errors {
            feedback.push_str(&format!("- {e}\n"));
        }
    }
    if !warnings.is_empty() {
        feedback.push_str("Warnings:\n");
        for w in warnings {
            feedback.push_str(&format!("- {w}\n"));
        }
    }

    format!(
        "{original_user_prompt}\n\n\
         Your previous response had validation problems.\n{feedback}\
         Fix these issues. Grounding excerpts must be verbatim quotes from \
         the transcript chunk above."
    )
}
