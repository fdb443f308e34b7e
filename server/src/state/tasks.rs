use anyhow::Context;
use chrono::Duration;

use crate::{
    auth::{
        oauth::{self, OAuthError},
        AuthStateStore, StoredToken, TokenStore,
    },
    server_config::OAuthConfig,
    HttpClient,
};

/// Refresh ahead of expiry by this much
const REFRESH_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    NotAuthenticated,
    StillValid,
    Refreshed,
}

/// Exchanges the stored refresh token when the access token is close to
/// expiring. A revoked refresh token clears the store so the next cycle
/// reports that re-authentication is needed.
pub async fn refresh_token_if_needed(
    http_client: &HttpClient,
    config: &OAuthConfig,
    token_store: &TokenStore,
) -> anyhow::Result<RefreshOutcome> {
    let Some(current) = token_store.current() else {
        return Ok(RefreshOutcome::NotAuthenticated);
    };

    if !current.expires_within(Duration::minutes(REFRESH_WINDOW_MINUTES)) {
        return Ok(RefreshOutcome::StillValid);
    }

    let refresh_token = current
        .refresh_token
        .as_deref()
        .ok_or(OAuthError::NoRefreshToken)
        .context("Access token expiring without a refresh token")?;

    tracing::info!("Access token expires at {}, refreshing", current.expires_at);
    match oauth::exchange_refresh_token(http_client, config, refresh_token).await {
        Ok(resp) => {
            token_store.update_after_refresh(StoredToken::from(resp));
            tracing::info!("Access token refreshed");
            Ok(RefreshOutcome::Refreshed)
        }
        Err(OAuthError::ExpiredOrRevoked) => {
            tracing::error!("Refresh token expired or revoked, re-authentication required");
            token_store.clear();
            Err(OAuthError::ExpiredOrRevoked.into())
        }
        Err(e) => Err(e).context("Failed to refresh access token"),
    }
}

pub fn sweep_auth_states(auth_states: &AuthStateStore) -> usize {
    auth_states.clean_store()
}
