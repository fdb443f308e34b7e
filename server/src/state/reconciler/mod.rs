//! Reconciliation cycle
//!
//! Fetches one page of the configured folder, narrows it to messages that are
//! newer than the watermark and absent from the ledger, then classifies, tags
//! and records each of them. Only one cycle runs at a time; a trigger that
//! arrives while a cycle is in flight is rejected with
//! [`CycleError::AlreadyRunning`].

mod candidates;
pub mod types;

use std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc};

use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use tokio::sync::Mutex;

pub use types::{
    CycleError, CycleSummary, MessageOutcome, ProcessedEmailInfo, ReconcilerSettings, SkipCounts,
};

use super::processing_store::{LedgerEntry, ProcessingStore};
use crate::{
    email::{client::MailboxGateway, message::Message},
    prompt::Classifier,
};
use candidates::select_candidates;

#[derive(Clone)]
pub struct InboxReconciler {
    mailbox: Arc<dyn MailboxGateway>,
    classifier: Arc<dyn Classifier>,
    store: ProcessingStore,
    settings: Arc<ReconcilerSettings>,
    in_flight: Arc<Mutex<()>>,
}

impl InboxReconciler {
    pub fn new(
        mailbox: Arc<dyn MailboxGateway>,
        classifier: Arc<dyn Classifier>,
        store: ProcessingStore,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            mailbox,
            classifier,
            store,
            settings: Arc::new(settings),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &ProcessingStore {
        &self.store
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub async fn run_cycle_once(&self) -> Result<CycleSummary, CycleError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::warn!("Reconciliation cycle already in flight, rejecting trigger");
            return Err(CycleError::AlreadyRunning);
        };

        let cycle_start = Utc::now();
        let last_check = self.store.watermark();
        tracing::info!(
            "Starting reconciliation cycle (folder={}, last check: {:?})",
            self.settings.folder,
            last_check
        );

        let page = self
            .mailbox
            .fetch(&self.settings.folder, self.settings.batch_size, 0)
            .await
            .map_err(|e| {
                if e.is_unauthorized() {
                    tracing::error!("Mailbox rejected credentials, re-authentication required");
                } else {
                    tracing::error!("Failed to fetch messages: {}", e);
                }
                CycleError::from(e)
            })?;

        if page.has_more {
            tracing::debug!("More messages available beyond the first page");
        }
        let fetched = page.messages.len();

        let (candidates, skipped) = select_candidates(page.messages, last_check, &self.store);
        tracing::info!(
            "Fetched {} messages, {} new ({} skipped)",
            fetched,
            candidates.len(),
            skipped.total()
        );

        let concurrency = self.settings.max_concurrent_classifications.max(1);
        let outcomes: Vec<MessageOutcome> = stream::iter(candidates)
            .map(|(key, message)| self.process_isolated(key, message))
            .buffered(concurrency)
            .collect()
            .await;

        let mut emails = Vec::new();
        let mut categories = BTreeMap::new();
        let mut failed = 0;
        let mut tag_failures = 0;
        for outcome in outcomes {
            match outcome {
                MessageOutcome::Processed(info) => {
                    *categories.entry(info.category).or_insert(0) += 1;
                    if !info.tag_applied {
                        tag_failures += 1;
                    }
                    emails.push(info);
                }
                MessageOutcome::AlreadyRecorded(id) => {
                    tracing::warn!("Message {} was recorded concurrently, skipping", id);
                }
                MessageOutcome::Failed { id, reason } => {
                    tracing::error!("Failed to process message {}: {}", id, reason);
                    failed += 1;
                }
            }
        }

        let new_check = self.store.advance_watermark(cycle_start);
        let summary = CycleSummary {
            processed: emails.len(),
            last_check,
            new_check,
            categories,
            emails,
            skipped,
            failed,
            tag_failures,
        };

        tracing::info!(
            "Reconciliation cycle complete: {} processed, {} failed, {} tag failures, categories: {:?}",
            summary.processed,
            summary.failed,
            summary.tag_failures,
            summary.categories
        );

        Ok(summary)
    }

    /// Runs one message through [`Self::process_message`], turning a panic
    /// into a failed outcome so the rest of the batch continues.
    async fn process_isolated(&self, key: String, message: Message) -> MessageOutcome {
        match AssertUnwindSafe(self.process_message(key.clone(), message))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                MessageOutcome::Failed {
                    id: key,
                    reason: format!("panicked: {}", reason),
                }
            }
        }
    }

    async fn process_message(&self, key: String, message: Message) -> MessageOutcome {
        let result = self
            .classifier
            .classify(
                &message.subject,
                &message.body_preview,
                &message.sender_address,
            )
            .await;

        let tag_applied = match self.mailbox.tag(&message.id, result.category.as_ref()).await {
            Ok(outcome) => {
                tracing::debug!("Tagged message {} ({:?})", key, outcome);
                true
            }
            Err(e) => {
                // The ledger entry is still written; the mailbox stays untagged
                tracing::error!(
                    "Failed to assign category {} to message {}: {}",
                    result.category,
                    key,
                    e
                );
                false
            }
        };

        let info = ProcessedEmailInfo {
            id: key.clone(),
            subject: message.subject.clone(),
            category: result.category,
            confidence: result.confidence,
            received_at: message.received_at,
            tag_applied,
        };

        let entry = LedgerEntry {
            internet_message_id: key.clone(),
            result,
            processed_at: Utc::now(),
            subject: message.subject,
            sender: message.sender_address,
            tag_applied,
        };

        if !self.store.record(entry) {
            return MessageOutcome::AlreadyRecorded(key);
        }

        MessageOutcome::Processed(info)
    }
}
