use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::types::SkipCounts;
use crate::{email::message::Message, state::processing_store::ProcessingStore};

/// Reduce a fetched page to the messages that still need classifying,
/// keyed by stable id and kept in fetch order.
///
/// With no watermark every fetched message is eligible. Once a watermark
/// exists, anything received at or before it is dropped, including
/// messages that carry no received time.
pub(super) fn select_candidates(
    messages: Vec<Message>,
    watermark: Option<DateTime<Utc>>,
    store: &ProcessingStore,
) -> (IndexMap<String, Message>, SkipCounts) {
    let mut skipped = SkipCounts::default();
    let mut candidates = IndexMap::with_capacity(messages.len());

    for message in messages {
        if let Some(watermark) = watermark {
            if !message.is_newer_than(watermark) {
                skipped.not_newer_than_watermark += 1;
                continue;
            }
        }

        let Some(key) = message.stable_id().map(str::to_string) else {
            tracing::warn!(
                "Skipping message {} without internet message id (subject: {:?})",
                message.id,
                message.subject
            );
            skipped.missing_identifier += 1;
            continue;
        };

        if store.contains(&key) {
            skipped.already_processed += 1;
            continue;
        }

        if candidates.contains_key(&key) {
            tracing::debug!("Duplicate message id in fetched page: {}", key);
            skipped.duplicate_in_batch += 1;
            continue;
        }

        candidates.insert(key, message);
    }

    (candidates, skipped)
}
