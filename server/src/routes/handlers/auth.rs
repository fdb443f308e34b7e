use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;

use crate::{
    auth::{
        oauth::{self, OAuthError},
        AuthStateStore, StoredToken, TokenStore,
    },
    error::{AppError, AppResult},
    server_config::OAuthConfig,
    HttpClient,
};

pub async fn handler_auth_login(
    State(oauth_config): State<Arc<OAuthConfig>>,
    State(auth_states): State<AuthStateStore>,
) -> Redirect {
    let state = auth_states.issue();
    let url = oauth::authorize_url(&oauth_config, &state.to_string());
    tracing::info!("Redirecting to Microsoft login");
    Redirect::to(url.as_str())
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub async fn handler_auth_callback(
    State(http_client): State<HttpClient>,
    State(oauth_config): State<Arc<OAuthConfig>>,
    State(auth_states): State<AuthStateStore>,
    State(token_store): State<TokenStore>,
    Query(params): Query<CallbackParams>,
) -> AppResult<Redirect> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_else(|| error.clone());
        tracing::error!("OAuth error from provider: {} - {}", error, description);
        return Err(AppError::BadRequest(format!(
            "Authentication failed: {}",
            description
        )));
    }

    let state = params.state.unwrap_or_default();
    if !auth_states.consume(&state) {
        tracing::warn!("Callback with unknown or expired state");
        return Err(OAuthError::InvalidState.into());
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or(OAuthError::MissingCode)?;

    let resp = oauth::exchange_code(&http_client, &oauth_config, &code).await?;
    token_store.store(StoredToken::from(resp));
    tracing::info!("Authentication successful");

    Ok(Redirect::to("/"))
}
