use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::prompt::{Category, ClassificationResult};

/// Record that a message has been classified. Written once per
/// internet message id and never modified afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub internet_message_id: String,
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub processed_at: DateTime<Utc>,
    pub subject: String,
    pub sender: String,
    /// False when the mailbox tag write failed after classification
    pub tag_applied: bool,
}

#[derive(Debug, Default)]
struct StoreInner {
    ledger: IndexMap<String, LedgerEntry>,
    watermark: Option<DateTime<Utc>>,
}

/// The processed-message ledger and the cycle watermark. Lives for the
/// process lifetime; nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ProcessingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, internet_message_id: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .ledger
            .contains_key(internet_message_id)
    }

    /// Inserts `entry` unless its id is already recorded.
    /// Returns false, leaving the existing entry untouched, on a repeat.
    pub fn record(&self, entry: LedgerEntry) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.ledger.contains_key(&entry.internet_message_id) {
            return false;
        }
        inner
            .ledger
            .insert(entry.internet_message_id.clone(), entry);
        true
    }

    pub fn get(&self, internet_message_id: &str) -> Option<LedgerEntry> {
        self.inner
            .read()
            .unwrap()
            .ledger
            .get(internet_message_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in the order they were recorded
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.read().unwrap().ledger.values().cloned().collect()
    }

    pub fn category_distribution(&self) -> BTreeMap<Category, usize> {
        let inner = self.inner.read().unwrap();
        let mut distribution = BTreeMap::new();
        for entry in inner.ledger.values() {
            *distribution.entry(entry.result.category).or_insert(0) += 1;
        }
        distribution
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.inner.read().unwrap().watermark
    }

    /// Moves the watermark forward to `to`. Never moves it backwards.
    pub fn advance_watermark(&self, to: DateTime<Utc>) -> DateTime<Utc> {
        let mut inner = self.inner.write().unwrap();
        let next = inner.watermark.map_or(to, |current| current.max(to));
        inner.watermark = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(id: &str, category: Category) -> LedgerEntry {
        LedgerEntry {
            internet_message_id: id.to_string(),
            result: ClassificationResult::new(category, 0.8, "test"),
            processed_at: Utc::now(),
            subject: format!("subject {id}"),
            sender: "sender@uiowa.edu".to_string(),
            tag_applied: true,
        }
    }

    #[test]
    fn test_first_record_wins() {
        let store = ProcessingStore::new();
        assert!(store.record(entry("<a@x>", Category::Academic)));
        assert!(!store.record(entry("<a@x>", Category::Promotional)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("<a@x>").unwrap().result.category, Category::Academic);
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let store = ProcessingStore::new();
        for id in ["<c@x>", "<a@x>", "<b@x>"] {
            store.record(entry(id, Category::Other));
        }
        let ids: Vec<_> = store
            .entries()
            .into_iter()
            .map(|e| e.internet_message_id)
            .collect();
        assert_eq!(ids, vec!["<c@x>", "<a@x>", "<b@x>"]);
    }

    #[test]
    fn test_category_distribution() {
        let store = ProcessingStore::new();
        store.record(entry("1", Category::Social));
        store.record(entry("2", Category::Social));
        store.record(entry("3", Category::Urgent));

        let distribution = store.category_distribution();
        assert_eq!(distribution.get(&Category::Social), Some(&2));
        assert_eq!(distribution.get(&Category::Urgent), Some(&1));
        assert_eq!(distribution.get(&Category::Academic), None);
    }

    #[test]
    fn test_watermark_never_moves_backwards() {
        let store = ProcessingStore::new();
        assert!(store.watermark().is_none());

        let now = Utc::now();
        assert_eq!(store.advance_watermark(now), now);
        assert_eq!(store.advance_watermark(now - Duration::minutes(5)), now);
        assert_eq!(store.watermark(), Some(now));

        let later = now + Duration::seconds(1);
        assert_eq!(store.advance_watermark(later), later);
    }

    #[test]
    fn test_ledger_entry_serializes_flat() {
        let value = serde_json::to_value(entry("<a@x>", Category::Urgent)).unwrap();
        assert_eq!(value["internetMessageId"], "<a@x>");
        assert_eq!(value["category"], "URGENT");
        assert_eq!(value["tagApplied"], true);
    }
}
