use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecipient {
    #[serde(default)]
    pub email_address: Option<GraphEmailAddress>,
}

/// A message as returned by `GET /me/mailFolders/{folder}/messages`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Option<GraphRecipient>,
    #[serde(default)]
    pub received_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body_preview: Option<String>,
    #[serde(default)]
    pub has_attachments: Option<bool>,
    #[serde(default)]
    pub internet_message_id: Option<String>,
}

impl GraphMessage {
    pub fn sender_address(&self) -> Option<&str> {
        self.from
            .as_ref()
            .and_then(|r| r.email_address.as_ref())
            .and_then(|e| e.address.as_deref())
    }
}

/// OData page wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMessagePage {
    #[serde(default)]
    pub value: Vec<GraphMessage>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

impl GraphMessagePage {
    pub fn has_more(&self) -> bool {
        self.next_link.is_some()
    }
}

/// Body of both `GET ?$select=categories` and the categories `PATCH`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCategories {
    #[serde(default)]
    pub categories: Vec<String>,
}

impl GraphCategories {
    /// Adds `category` if absent. Returns false when it was already present.
    pub fn add(&mut self, category: &str) -> bool {
        if self.categories.iter().any(|c| c == category) {
            return false;
        }
        self.categories.push(category.to_string());
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphApiError {
    pub error: GraphApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphApiErrorDetail {
    pub code: String,
    pub message: String,
}
