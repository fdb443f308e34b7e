use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use serde::Serialize;

use crate::{email::client::MailboxError, prompt::Category, server_config::Settings};

#[derive(Debug, Display)]
pub enum CycleError {
    #[display("A reconciliation cycle is already in flight")]
    AlreadyRunning,
    #[display("Mailbox requires re-authentication: {_0}")]
    Unauthorized(String),
    #[display("Failed to fetch messages: {_0}")]
    Fetch(MailboxError),
}

impl std::error::Error for CycleError {}

impl From<MailboxError> for CycleError {
    fn from(error: MailboxError) -> Self {
        match error {
            MailboxError::Unauthorized(message) => CycleError::Unauthorized(message),
            other => CycleError::Fetch(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub folder: String,
    pub batch_size: u32,
    pub max_concurrent_classifications: usize,
}

impl From<&Settings> for ReconcilerSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            folder: settings.folder.clone(),
            batch_size: settings.batch_size,
            max_concurrent_classifications: settings.max_concurrent_classifications,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEmailInfo {
    pub id: String,
    pub subject: String,
    pub category: Category,
    pub confidence: f32,
    #[serde(rename = "receivedDateTime")]
    pub received_at: Option<DateTime<Utc>>,
    pub tag_applied: bool,
}

/// What happened to one candidate message within a cycle
#[derive(Debug)]
pub enum MessageOutcome {
    Processed(ProcessedEmailInfo),
    /// The ledger already held the id when the entry was written
    AlreadyRecorded(String),
    Failed { id: String, reason: String },
}

/// Messages dropped before classification, by reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCounts {
    pub not_newer_than_watermark: usize,
    pub missing_identifier: usize,
    pub already_processed: usize,
    pub duplicate_in_batch: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.not_newer_than_watermark
            + self.missing_identifier
            + self.already_processed
            + self.duplicate_in_batch
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub processed: usize,
    pub last_check: Option<DateTime<Utc>>,
    pub new_check: DateTime<Utc>,
    pub categories: BTreeMap<Category, usize>,
    pub emails: Vec<ProcessedEmailInfo>,
    pub skipped: SkipCounts,
    pub failed: usize,
    pub tag_failures: usize,
}
