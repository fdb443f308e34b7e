use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::util::check_expired;

/// Source of bearer tokens for the mailbox gateway.
/// The gateway never refreshes; `None` means the cycle cannot run.
pub trait CredentialProvider: Send + Sync {
    fn get_valid_access_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in as i64),
        }
    }

    pub fn is_expired(&self) -> bool {
        check_expired(self.expires_at)
    }

    pub fn expires_within(&self, window: Duration) -> bool {
        Utc::now() + window > self.expires_at
    }
}

/// In-memory token cache for the single connected mailbox
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<StoredToken>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, token: StoredToken) {
        tracing::info!("Stored access token (expires at {})", token.expires_at);
        *self.inner.write().unwrap() = Some(token);
    }

    /// Keeps the previous refresh token when the provider does not rotate it
    pub fn update_after_refresh(&self, mut token: StoredToken) {
        let mut inner = self.inner.write().unwrap();
        if token.refresh_token.is_none() {
            token.refresh_token = inner.as_ref().and_then(|t| t.refresh_token.clone());
        }
        *inner = Some(token);
    }

    pub fn current(&self) -> Option<StoredToken> {
        self.inner.read().unwrap().clone()
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap() = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_valid_access_token().is_some()
    }
}

impl CredentialProvider for TokenStore {
    fn get_valid_access_token(&self) -> Option<String> {
        let inner = self.inner.read().unwrap();
        let Some(token) = inner.as_ref() else {
            tracing::warn!("No token found for connected mailbox");
            return None;
        };
        if token.is_expired() {
            tracing::warn!("Token expired (expired at {})", token.expires_at);
            return None;
        }
        Some(token.access_token.trim().to_string())
    }
}
