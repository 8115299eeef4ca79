//! Cross-chunk deduplication.
//!
//! Overlapping chunks extract the same event twice; merging by dedup key
//! keeps first-seen order and the better-scored duplicate. The merge is
//! idempotent: merging its own output changes nothing.

use indexmap::IndexMap;

use crate::types::item::ExtractionItem;

/// Merge items from every chunk, deduplicating by key.
///
/// On a key collision the item with the higher relevance score wins;
/// confidence breaks ties.
pub fn merge_items(items: impl IntoIterator<Item = ExtractionItem>) -> Vec<ExtractionItem> {
    let mut merged: IndexMap<String, ExtractionItem> = IndexMap::new();

    for item in items {
        let key = item.dedup_key();
        match merged.get_mut(&key) {
            None => {
                merged.insert(key, item);
            }
            Some(existing) => {
                if beats(&item, existing) {
                    *existing = item;
                }
            }
        }
    }

    merged.into_values().collect()
}

fn beats(challenger: &ExtractionItem, incumbent: &ExtractionItem) -> bool {
    let c = challenger.base();
    let i = incumbent.base();
    c.relevance_score > i.relevance_score
        || (c.relevance_score == i.relevance_score && c.confidence > i.confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::item::{ConfidenceLevel, ItemBase, NewsItem};

    fn item(title: &str, summary: &str, relevance: u8, confidence: ConfidenceLevel) -> ExtractionItem {
        ExtractionItem::News(NewsItem {
            base: ItemBase::new("v", "c", "u")
                .with_relevance(relevance)
                .with_confidence(confidence),
            title: title.into(),
            summary: summary.into(),
            entities: vec![],
        })
    }

    #[test]
    fn test_distinct_items_all_kept_in_order() {
        let merged = merge_items(vec![
            item("A", "first story", 5, ConfidenceLevel::Medium),
            item("B", "second story", 5, ConfidenceLevel::Medium),
            item("C", "third story", 5, ConfidenceLevel::Medium),
        ]);

        let titles: Vec<&str> = merged.iter().map(|i| i.title()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_duplicate_keeps_higher_relevance() {
        let merged = merge_items(vec![
            item("Same", "identical summary text", 4, ConfidenceLevel::High),
            item("Same", "identical summary text", 8, ConfidenceLevel::Low),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].base().relevance_score, 8);
    }

    #[test]
    fn test_tie_breaks_on_confidence() {
        let merged = merge_items(vec![
            item("Same", "identical summary text", 6, ConfidenceLevel::Low),
            item("Same", "identical summary text", 6, ConfidenceLevel::High),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].base().confidence, ConfidenceLevel::High);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let items = vec![
            item("A", "first story", 5, ConfidenceLevel::Medium),
            item("A", "first story", 7, ConfidenceLevel::Medium),
            item("B", "second story", 5, ConfidenceLevel::High),
        ];

        let once = merge_items(items);
        let twice = merge_items(once.clone());
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }

    #[test]
    fn test_dedup_key_ignores_case_and_whitespace() {
        let merged = merge_items(vec![
            item("Firefox  Release", "Mozilla shipped it.", 5, ConfidenceLevel::Medium),
            item("firefox release", "Mozilla  shipped it.", 5, ConfidenceLevel::Medium),
        ]);

        assert_eq!(merged.len(), 1);
    }
}
