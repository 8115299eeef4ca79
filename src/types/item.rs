//! Extraction item types - the output shape of the engine.
//!
//! `ExtractionItem` is a closed tagged union discriminated by an explicit
//! `kind` field; downstream logic pattern-matches on the variant instead of
//! probing fields structurally.

use serde::{Deserialize, Serialize};

/// Confidence tier assigned by the extracting model (and adjusted by
/// validation / hallucination checks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Numeric value used when blending confidences across providers.
    pub fn as_score(&self) -> f64 {
        match self {
            ConfidenceLevel::High => 0.9,
            ConfidenceLevel::Medium => 0.6,
            ConfidenceLevel::Low => 0.3,
        }
    }

    /// Map a blended score back to a tier.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceLevel::High
        } else if score >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Fields shared by every item variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBase {
    pub source_video_id: String,
    pub source_channel_id: String,
    pub source_url: String,

    /// Position in the video, seconds from start, when the model could
    /// attribute the claim to a point in time
    pub timestamp: Option<f64>,

    pub confidence: ConfidenceLevel,

    /// Verbatim (or near-verbatim) substring of the source chunk that
    /// supports the item's claim. The central invariant enforced by
    /// validation: items whose excerpt cannot be located in the source
    /// text never reach the output.
    pub grounding_excerpt: String,

    /// Editorial relevance, 1 (noise) to 10 (headline)
    pub relevance_score: u8,
}

impl ItemBase {
    pub fn new(
        video_id: impl Into<String>,
        channel_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source_video_id: video_id.into(),
            source_channel_id: channel_id.into(),
            source_url: url.into(),
            timestamp: None,
            confidence: ConfidenceLevel::Medium,
            grounding_excerpt: String::new(),
            relevance_score: 5,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.grounding_excerpt = excerpt.into();
        self
    }

    pub fn with_confidence(mut self, confidence: ConfidenceLevel) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_relevance(mut self, score: u8) -> Self {
        self.relevance_score = score.clamp(1, 10);
        self
    }

    pub fn with_timestamp(mut self, ts: f64) -> Self {
        self.timestamp = Some(ts);
        self
    }
}

/// A news fact extracted from reporting/commentary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(flatten)]
    pub base: ItemBase,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Which side a debate participant takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Pro,
    Contra,
    Neutral,
}

/// One position voiced in a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub stance: Stance,
    /// Who holds the position, when attributable
    pub holder: Option<String>,
    pub statement: String,
}

/// A debate topic with the positions taken on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateItem {
    #[serde(flatten)]
    pub base: ItemBase,
    pub topic: String,
    pub summary: String,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Category of a developer action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevAction {
    Release,
    Update,
    Announcement,
    Deprecation,
    Tool,
}

/// A developer action (release, update, announcement, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevItem {
    #[serde(flatten)]
    pub base: ItemBase,
    pub title: String,
    pub summary: String,
    pub action: DevAction,
    /// Referenced URLs; possibly empty but always present
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// A tagged variant over the three item shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExtractionItem {
    News(NewsItem),
    Debate(DebateItem),
    Dev(DevItem),
}

impl ExtractionItem {
    /// Shared base fields, regardless of variant.
    pub fn base(&self) -> &ItemBase {
        match self {
            ExtractionItem::News(i) => &i.base,
            ExtractionItem::Debate(i) => &i.base,
            ExtractionItem::Dev(i) => &i.base,
        }
    }

    /// Mutable access to the shared base.
    pub fn base_mut(&mut self) -> &mut ItemBase {
        match self {
            ExtractionItem::News(i) => &mut i.base,
            ExtractionItem::Debate(i) => &mut i.base,
            ExtractionItem::Dev(i) => &mut i.base,
        }
    }

    /// The headline field of the variant (topic for debates).
    pub fn title(&self) -> &str {
        match self {
            ExtractionItem::News(i) => &i.title,
            ExtractionItem::Debate(i) => &i.topic,
            ExtractionItem::Dev(i) => &i.title,
        }
    }

    /// The summary field of the variant.
    pub fn summary(&self) -> &str {
        match self {
            ExtractionItem::News(i) => &i.summary,
            ExtractionItem::Debate(i) => &i.summary,
            ExtractionItem::Dev(i) => &i.summary,
        }
    }

    /// Claimed entities of the variant.
    pub fn entities(&self) -> &[String] {
        match self {
            ExtractionItem::News(i) => &i.entities,
            ExtractionItem::Debate(i) => &i.entities,
            ExtractionItem::Dev(i) => &i.entities,
        }
    }

    /// Normalized key used for cross-chunk dedup and ensemble agreement
    /// matching: lowercased title plus the first 40 characters of the
    /// lowercased summary, with whitespace collapsed.
    pub fn dedup_key(&self) -> String {
        let normalize = |s: &str| {
            s.to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        };
        let title = normalize(self.title());
        let summary = normalize(self.summary());
        let prefix: String = summary.chars().take(40).collect();
        format!("{title}|{prefix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn news(title: &str, summary: &str) -> ExtractionItem {
        ExtractionItem::News(NewsItem {
            base: ItemBase::new("v", "c", "u"),
            title: title.into(),
            summary: summary.into(),
            entities: vec![],
        })
    }

    #[test]
    fn test_dedup_key_normalizes_whitespace_and_case() {
        let a = news("GPT-X Launch", "OpenAI  announced GPT-X today");
        let b = news("gpt-x launch", "openai announced gpt-x today");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_differs_on_title() {
        let a = news("GPT-X Launch", "same summary");
        let b = news("GPT-Y Launch", "same summary");
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(ConfidenceLevel::High > ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium > ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.2), ConfidenceLevel::Low);
    }

    #[test]
    fn test_kind_tag_serialization() {
        let item = news("Title", "Summary");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "news");
        assert_eq!(json["title"], "Title");
        // Base fields flatten into the variant object
        assert_eq!(json["source_video_id"], "v");
    }

    #[test]
    fn test_relevance_clamped() {
        let base = ItemBase::new("v", "c", "u").with_relevance(99);
        assert_eq!(base.relevance_score, 10);
    }
}
