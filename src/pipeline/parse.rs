//! Parse model responses into extraction items.
//!
//! Models answer with a JSON object (sometimes wrapped in a markdown code
//! fence); the raw shapes here tolerate missing optional fields and are
//! transformed into `ExtractionItem`s by injecting the video metadata the
//! model never sees.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::item::{
    ConfidenceLevel, DebateItem, DevAction, DevItem, ExtractionItem, ItemBase, NewsItem, Position,
    Stance,
};
use crate::types::transcript::VideoMetadata;

/// The envelope every extraction call returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExtractionResponse {
    #[serde(default)]
    pub items: Vec<RawItem>,

    /// Self-reported confidence for the call as a whole
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// One item as the model emits it, before metadata injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawItem {
    News {
        title: String,
        summary: String,
        #[serde(default)]
        entities: Vec<String>,
        #[serde(flatten)]
        common: RawCommon,
    },
    Debate {
        topic: String,
        summary: String,
        #[serde(default)]
        positions: Vec<RawPosition>,
        #[serde(default)]
        entities: Vec<String>,
        #[serde(flatten)]
        common: RawCommon,
    },
    Dev {
        title: String,
        summary: String,
        action: String,
        #[serde(default)]
        links: Vec<String>,
        #[serde(default)]
        entities: Vec<String>,
        #[serde(flatten)]
        common: RawCommon,
    },
}

/// Fields common to every raw item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCommon {
    #[serde(default)]
    pub grounding_excerpt: String,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub relevance_score: Option<u8>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosition {
    pub stance: String,
    #[serde(default)]
    pub holder: Option<String>,
    pub statement: String,
}

/// Parse the model's response text, tolerating a markdown code fence.
pub fn parse_extraction_response(text: &str) -> Result<RawExtractionResponse> {
    match serde_json::from_str(text) {
        Ok(parsed) => Ok(parsed),
        Err(_) => {
            let salvaged = text
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            Ok(serde_json::from_str(salvaged)?)
        }
    }
}

fn parse_confidence(value: Option<&str>) -> ConfidenceLevel {
    match value.map(|s| s.to_lowercase()) {
        Some(ref s) if s == "high" => ConfidenceLevel::High,
        Some(ref s) if s == "low" => ConfidenceLevel::Low,
        _ => ConfidenceLevel::Medium,
    }
}

fn parse_stance(value: &str) -> Stance {
    match value.to_lowercase().as_str() {
        "pro" => Stance::Pro,
        "contra" | "con" | "against" => Stance::Contra,
        _ => Stance::Neutral,
    }
}

fn parse_action(value: &str) -> Option<DevAction> {
    match value.to_lowercase().as_str() {
        "release" => Some(DevAction::Release),
        "update" => Some(DevAction::Update),
        "announcement" => Some(DevAction::Announcement),
        "deprecation" => Some(DevAction::Deprecation),
        "tool" => Some(DevAction::Tool),
        _ => None,
    }
}

fn make_base(common: &RawCommon, video_id: &str, meta: &VideoMetadata) -> ItemBase {
    let mut base = ItemBase::new(video_id, &meta.channel_id, &meta.source_url)
        .with_excerpt(&common.grounding_excerpt)
        .with_confidence(parse_confidence(common.confidence.as_deref()))
        .with_relevance(common.relevance_score.unwrap_or(5));
    base.timestamp = common.timestamp;
    base
}

/// Transform a raw item into an `ExtractionItem`, injecting metadata.
///
/// Returns `None` for items the transform cannot repair (an unknown dev
/// action); schema-level problems beyond that are the validator's job.
pub fn transform_item(
    raw: RawItem,
    video_id: &str,
    meta: &VideoMetadata,
) -> Option<ExtractionItem> {
    match raw {
        RawItem::News {
            title,
            summary,
            entities,
            common,
        } => Some(ExtractionItem::News(NewsItem {
            base: make_base(&common, video_id, meta),
            title,
            summary,
            entities,
        })),
        RawItem::Debate {
            topic,
            summary,
            positions,
            entities,
            common,
        } => Some(ExtractionItem::Debate(DebateItem {
            base: make_base(&common, video_id, meta),
            topic,
            summary,
            positions: positions
                .into_iter()
                .map(|p| Position {
                    stance: parse_stance(&p.stance),
                    holder: p.holder,
                    statement: p.statement,
                })
                .collect(),
            entities,
        })),
        RawItem::Dev {
            title,
            summary,
            action,
            links,
            entities,
            common,
        } => {
            let action = parse_action(&action)?;
            Some(ExtractionItem::Dev(DevItem {
                base: make_base(&common, video_id, meta),
                title,
                summary,
                action,
                links,
                entities,
            }))
        }
    }
}

/// Transform every raw item, silently skipping unrepairable ones.
pub fn transform_items(
    raw: Vec<RawItem>,
    video_id: &str,
    meta: &VideoMetadata,
) -> Vec<ExtractionItem> {
    raw.into_iter()
        .filter_map(|r| transform_item(r, video_id, meta))
        .collect()
}

/// Serialize items back to the model-facing JSON shape (for refinement).
pub fn items_to_model_json(items: &[ExtractionItem]) -> String {
    serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> VideoMetadata {
        VideoMetadata::new("Title", "Channel", "chan1", "https://example.com/v")
    }

    #[test]
    fn test_parse_plain_json() {
        let text = r#"{"items": [{"kind": "news", "title": "T", "summary": "S",
            "grounding_excerpt": "quote", "confidence": "high",
            "relevance_score": 7}], "confidence": 0.9}"#;

        let parsed = parse_extraction_response(text).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.confidence, 0.9);
    }

    #[test]
    fn test_parse_code_fenced_json() {
        let text = "```json\n{\"items\": [], \"confidence\": 0.4}\n```";
        let parsed = parse_extraction_response(text).unwrap();
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.confidence, 0.4);
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_extraction_response("not json at all").is_err());
    }

    #[test]
    fn test_transform_injects_metadata() {
        let raw = RawItem::News {
            title: "T".into(),
            summary: "S".into(),
            entities: vec!["OpenAI".into()],
            common: RawCommon {
                grounding_excerpt: "quote".into(),
                confidence: Some("high".into()),
                relevance_score: Some(8),
                timestamp: Some(42.0),
            },
        };

        let item = transform_item(raw, "vid1", &meta()).unwrap();
        let base = item.base();
        assert_eq!(base.source_video_id, "vid1");
        assert_eq!(base.source_channel_id, "chan1");
        assert_eq!(base.confidence, ConfidenceLevel::High);
        assert_eq!(base.timestamp, Some(42.0));
    }

    #[test]
    fn test_unknown_dev_action_dropped() {
        let raw = RawItem::Dev {
            title: "T".into(),
            summary: "S".into(),
            action: "celebration".into(),
            links: vec![],
            entities: vec![],
            common: RawCommon::default(),
        };
        assert!(transform_item(raw, "v", &meta()).is_none());
    }

    #[test]
    fn test_stance_aliases() {
        assert_eq!(parse_stance("con"), Stance::Contra);
        assert_eq!(parse_stance("AGAINST"), Stance::Contra);
        assert_eq!(parse_stance("pro"), Stance::Pro);
        assert_eq!(parse_stance("mixed"), Stance::Neutral);
    }
}
