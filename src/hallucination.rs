//! Hallucination detection - a deeper audit than validation.
//!
//! Validation asks "is this item well-formed and grounded"; this module
//! asks "did the model invent anything". Four independent checks produce
//! severity-ranked issues which aggregate into a recommended confidence
//! adjustment. The audit is optional and off by default because the
//! semantic check costs an embedding call per item.

use std::sync::OnceLock;

use regex::Regex;

use crate::traits::provider::{cosine_similarity, Embedder};
use crate::types::chunk::Chunk;
use crate::types::item::ExtractionItem;
use crate::validate::{fuzzy_match, significant_words};

/// Claim-support ratio below which the summary is flagged.
const SUPPORT_MAJOR_THRESHOLD: f64 = 0.5;

/// Claim-support ratio below which the summary is considered invented.
const SUPPORT_CRITICAL_THRESHOLD: f64 = 0.3;

/// Cosine similarity below which the summary drifts from its excerpt.
const SEMANTIC_MAJOR_THRESHOLD: f64 = 0.5;

/// Cosine similarity below which the summary is unrelated to its excerpt.
const SEMANTIC_CRITICAL_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone)]
pub struct HallucinationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    UnverifiedEntity,
    UnsupportedClaim,
    SemanticDrift,
    FabricatedDetail,
}

/// What the caller should do with the item's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceAdjustment {
    /// Keep as-is
    High,
    /// Mild downgrade
    Medium,
    /// Strong downgrade
    Low,
    /// Drop the item
    Reject,
}

#[derive(Debug, Clone)]
pub struct HallucinationCheck {
    pub has_hallucinations: bool,
    /// Aggregate confidence that the item is faithful, in [0, 1]
    pub confidence: f64,
    pub issues: Vec<HallucinationIssue>,
    pub recommended_adjustment: ConfidenceAdjustment,
}

/// Runs the four checks. The semantic check only runs when an embedder
/// is attached.
pub struct HallucinationDetector<'a> {
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> HallucinationDetector<'a> {
    pub fn new() -> Self {
        Self { embedder: None }
    }

    pub fn with_embedder(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder: Some(embedder),
        }
    }

    pub async fn audit(&self, item: &ExtractionItem, chunk: &Chunk) -> HallucinationCheck {
        let mut issues = Vec::new();

        self.check_entities(item, chunk, &mut issues);
        self.check_claim_support(item, &mut issues);
        self.check_fabricated_details(item, chunk, &mut issues);
        self.check_semantic(item, &mut issues).await;

        aggregate(issues)
    }

    fn check_entities(&self, item: &ExtractionItem, chunk: &Chunk, issues: &mut Vec<HallucinationIssue>) {
        for entity in item.entities() {
            if !fuzzy_match(entity, &chunk.text) {
                issues.push(HallucinationIssue {
                    kind: IssueKind::UnverifiedEntity,
                    severity: Severity::Major,
                    description: format!("entity '{entity}' does not appear in the source"),
                });
            }
        }
    }

    fn check_claim_support(&self, item: &ExtractionItem, issues: &mut Vec<HallucinationIssue>) {
        let words = significant_words(item.summary());
        if words.is_empty() {
            return;
        }

        // The claim must be supported by its own excerpt, not merely by
        // words appearing somewhere else in the chunk
        let excerpt = item.base().grounding_excerpt.to_lowercase();
        let found = words.iter().filter(|w| excerpt.contains(w.as_str())).count();
        let ratio = found as f64 / words.len() as f64;

        if ratio < SUPPORT_CRITICAL_THRESHOLD {
            issues.push(HallucinationIssue {
                kind: IssueKind::UnsupportedClaim,
                severity: Severity::Critical,
                description: format!("only {:.0}% of summary terms appear in the excerpt", ratio * 100.0),
            });
        } else if ratio < SUPPORT_MAJOR_THRESHOLD {
            issues.push(HallucinationIssue {
                kind: IssueKind::UnsupportedClaim,
                severity: Severity::Major,
                description: format!("only {:.0}% of summary terms appear in the excerpt", ratio * 100.0),
            });
        }
    }

    fn check_fabricated_details(&self, item: &ExtractionItem, chunk: &Chunk, issues: &mut Vec<HallucinationIssue>) {
        let claimed = format!("{} {}", item.summary(), item.base().grounding_excerpt);

        // Numbers and versions the source never states are the strongest
        // fabrication signal (the model changed "100K" to "200K")
        for number in number_regex().find_iter(&claimed) {
            if !chunk.text.contains(number.as_str()) {
                issues.push(HallucinationIssue {
                    kind: IssueKind::FabricatedDetail,
                    severity: Severity::Critical,
                    description: format!("figure '{}' not stated in the source", number.as_str()),
                });
            }
        }

        for date in date_regex().find_iter(&claimed) {
            if !chunk.text.contains(date.as_str()) {
                issues.push(HallucinationIssue {
                    kind: IssueKind::FabricatedDetail,
                    severity: Severity::Major,
                    description: format!("date '{}' not stated in the source", date.as_str()),
                });
            }
        }
    }

    async fn check_semantic(&self, item: &ExtractionItem, issues: &mut Vec<HallucinationIssue>) {
        let Some(embedder) = self.embedder else {
            return;
        };

        let excerpt = item.base().grounding_excerpt.as_str();
        let vectors = match embedder.embed_batch(&[item.summary(), excerpt]).await {
            Ok(v) if v.len() == 2 => v,
            Ok(_) => return,
            Err(error) => {
                tracing::warn!(%error, "embedding failed, skipping semantic check");
                return;
            }
        };

        let similarity = cosine_similarity(&vectors[0], &vectors[1]);
        if similarity < SEMANTIC_CRITICAL_THRESHOLD {
            issues.push(HallucinationIssue {
                kind: IssueKind::SemanticDrift,
                severity: Severity::Critical,
                description: format!("summary similarity {similarity:.2} - unrelated to its excerpt"),
            });
        } else if similarity < SEMANTIC_MAJOR_THRESHOLD {
            issues.push(HallucinationIssue {
                kind: IssueKind::SemanticDrift,
                severity: Severity::Major,
                description: format!("summary similarity {similarity:.2} - drifts from its excerpt"),
            });
        }
    }
}

impl Default for HallucinationDetector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn aggregate(issues: Vec<HallucinationIssue>) -> HallucinationCheck {
    let critical = issues.iter().filter(|i| i.severity == Severity::Critical).count();
    let major = issues.iter().filter(|i| i.severity == Severity::Major).count();
    let minor = issues.iter().filter(|i| i.severity == Severity::Minor).count();

    let confidence =
        (1.0 - 0.4 * critical as f64 - 0.2 * major as f64 - 0.1 * minor as f64).max(0.0);

    let recommended_adjustment = if critical > 0 {
        ConfidenceAdjustment::Reject
    } else if major >= 2 {
        ConfidenceAdjustment::Low
    } else if confidence > 0.8 {
        ConfidenceAdjustment::High
    } else if confidence >= 0.6 {
        ConfidenceAdjustment::Medium
    } else {
        ConfidenceAdjustment::Low
    };

    HallucinationCheck {
        has_hallucinations: !issues.is_empty(),
        confidence,
        issues,
        recommended_adjustment,
    }
}

/// Version strings and figures: "1.2.3", "v2.0", "100K", "3,000"
fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bv?\d+(?:[.,]\d+)*\s?[KkMmBb]?\b").expect("static regex")
    })
}

/// Month-name dates and ISO dates
fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:,\s*\d{4})?\b|\b\d{4}-\d{2}-\d{2}\b",
        )
        .expect("static regex")
    })
}
