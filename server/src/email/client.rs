use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use derive_more::derive::Display;
use lib_email_clients::graph::{
    folders::WellKnownFolder,
    types::{GraphApiError, GraphCategories, GraphMessagePage},
    MESSAGE_ORDER_BY, MESSAGE_SELECT_FIELDS,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::message::Message;
use crate::{auth::CredentialProvider, util::redact, HttpClient};

#[derive(Debug, Clone, Display)]
pub enum MailboxError {
    /// No usable credential, or the provider rejected it (HTTP 401)
    #[display("Unauthorized: {_0}")]
    Unauthorized(String),
    #[display("Graph API returned error {status}: {body}")]
    Provider { status: u16, body: String },
    #[display("Network error: {_0}")]
    Network(String),
    #[display("Could not decode Graph response: {_0}")]
    Decode(String),
    #[display("Graph API call timed out")]
    Timeout,
}

impl std::error::Error for MailboxError {}

impl MailboxError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, MailboxError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for MailboxError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            MailboxError::Timeout
        } else if error.is_decode() {
            MailboxError::Decode(error.to_string())
        } else {
            MailboxError::Network(error.to_string())
        }
    }
}

pub type MailboxResult<T> = Result<T, MailboxError>;

/// One page of a folder listing, newest received first
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Added,
    AlreadyPresent,
}

/// Read and tag access to a single mailbox
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Fetch `page_size` messages from `folder` starting at `offset`,
    /// ordered newest received first.
    async fn fetch(&self, folder: &str, page_size: u32, offset: u32)
        -> MailboxResult<MessagePage>;

    /// Add `category` to the message's tag set, keeping existing tags.
    async fn tag(&self, message_local_id: &str, category: &str) -> MailboxResult<TagOutcome>;
}

/// [`MailboxGateway`] over the Microsoft Graph mail API.
///
/// Tagging is a read-modify-write of the message's `categories` and is not
/// transactional: a concurrent change made elsewhere between the read and
/// the write is lost. Graph offers no precondition to guard against it.
#[derive(Clone)]
pub struct GraphMailbox {
    http_client: HttpClient,
    credentials: Arc<dyn CredentialProvider>,
    base_url: Url,
    request_timeout: Duration,
}

impl GraphMailbox {
    pub fn new(
        http_client: HttpClient,
        credentials: Arc<dyn CredentialProvider>,
        base_url: &str,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Graph base URL cannot be a base: {}", base_url);
        }
        Ok(Self {
            http_client,
            credentials,
            base_url,
            request_timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("me").extend(segments);
        }
        url
    }

    fn access_token(&self) -> MailboxResult<String> {
        let token = self.credentials.get_valid_access_token().ok_or_else(|| {
            MailboxError::Unauthorized("Not authenticated. Token expired or missing.".to_string())
        })?;
        tracing::debug!("Using token: {}", redact(&token));
        Ok(token)
    }

    async fn send(&self, req: RequestBuilder) -> MailboxResult<Response> {
        let resp = tokio::time::timeout(self.request_timeout, req.send())
            .await
            .map_err(|_| MailboxError::Timeout)??;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GraphApiError>(&body)
            .map(|e| format!("{}: {}", e.error.code, e.error.message))
            .unwrap_or(body);

        if status == StatusCode::UNAUTHORIZED {
            tracing::error!("Graph API returned 401 Unauthorized: {}", message);
            return Err(MailboxError::Unauthorized(
                "Access token is invalid or expired. Please re-authenticate.".to_string(),
            ));
        }

        tracing::error!("Graph API returned error {}: {}", status, message);
        Err(MailboxError::Provider {
            status: status.as_u16(),
            body: message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, resp: Response) -> MailboxResult<T> {
        tokio::time::timeout(self.request_timeout, resp.json::<T>())
            .await
            .map_err(|_| MailboxError::Timeout)?
            .map_err(|e| MailboxError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MailboxGateway for GraphMailbox {
    async fn fetch(
        &self,
        folder: &str,
        page_size: u32,
        offset: u32,
    ) -> MailboxResult<MessagePage> {
        let folder = WellKnownFolder::parse(folder).unwrap_or_else(|| {
            tracing::warn!("Unknown mail folder '{}', reading the inbox instead", folder);
            WellKnownFolder::Inbox
        });
        let token = self.access_token()?;
        let url = self.endpoint(&["mailFolders", folder.as_str(), "messages"]);
        let top = page_size.max(1).to_string();
        let skip = offset.to_string();

        tracing::info!(
            "Fetching messages from Graph API (folder={}, top={}, skip={})",
            folder,
            top,
            skip
        );

        let req = self
            .http_client
            .get(url)
            .bearer_auth(&token)
            .query(&[
                ("$select", MESSAGE_SELECT_FIELDS),
                ("$orderby", MESSAGE_ORDER_BY),
                ("$top", top.as_str()),
                ("$skip", skip.as_str()),
            ]);

        let resp = self.send(req).await?;
        let page: GraphMessagePage = self.json(resp).await?;
        let has_more = page.has_more();

        tracing::info!(
            "Fetched {} messages from Graph API (has_more={})",
            page.value.len(),
            has_more
        );

        Ok(MessagePage {
            messages: page.value.into_iter().map(Message::from).collect(),
            has_more,
        })
    }

    async fn tag(&self, message_local_id: &str, category: &str) -> MailboxResult<TagOutcome> {
        let token = self.access_token()?;
        let url = self.endpoint(&["messages", message_local_id]);

        let req = self
            .http_client
            .get(url.clone())
            .bearer_auth(&token)
            .query(&[("$select", "categories")]);
        let resp = self.send(req).await?;
        let mut current: GraphCategories = self.json(resp).await?;

        if !current.add(category) {
            tracing::debug!("Message already tagged with '{}'", category);
            return Ok(TagOutcome::AlreadyPresent);
        }

        tracing::debug!("Updating message categories to: {:?}", current.categories);
        let req = self
            .http_client
            .patch(url)
            .bearer_auth(&token)
            .json(&current);
        self.send(req).await?;

        tracing::info!("Assigned category '{}' to message", category);
        Ok(TagOutcome::Added)
    }
}
