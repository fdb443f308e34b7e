//! Authorization-code flow against the Microsoft identity platform.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use url::Url;

use super::token_store::StoredToken;
use crate::{server_config::OAuthConfig, HttpClient};

/// Tenant id Microsoft uses for consumer (outlook.com, hotmail.com) accounts
const CONSUMER_TENANT: &str = "9188040d-6c67-4c5b-b112-36a304b66dad";

#[derive(Debug, Display)]
pub enum OAuthError {
    InvalidState,
    MissingCode,
    #[display("Provider error: {_0}")]
    Provider(String),
    BadOauthResponse,
    ExpiredOrRevoked,
    NoRefreshToken,
    #[display("Unexpected: {_0}")]
    Unexpected(String),
}

impl std::error::Error for OAuthError {}

pub type OAuthResult<T> = Result<T, OAuthError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl From<TokenResponse> for StoredToken {
    fn from(resp: TokenResponse) -> Self {
        StoredToken::new(resp.access_token, resp.refresh_token, resp.expires_in)
    }
}

pub fn authorize_url(config: &OAuthConfig, state: &str) -> Url {
    let mut url = config.authorize_url();
    url.query_pairs_mut().extend_pairs(&[
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("response_type", "code"),
        ("response_mode", "query"),
        ("scope", config.scopes.join(" ").as_str()),
        ("state", state),
        ("prompt", "select_account"),
    ]);
    url
}

async fn post_token_form(
    http_client: &HttpClient,
    config: &OAuthConfig,
    form: &[(&str, &str)],
) -> OAuthResult<TokenResponse> {
    let resp = http_client
        .post(config.token_url())
        .form(form)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("Error calling token endpoint: {:?}", e);
            OAuthError::Unexpected(e.to_string())
        })?;

    let resp = resp.json::<serde_json::Value>().await.map_err(|e| {
        tracing::error!("Unexpected serde error: {:?}", e);
        OAuthError::BadOauthResponse
    })?;

    if let Some(error) = resp.get("error").and_then(|e| e.as_str()) {
        let desc = resp
            .get("error_description")
            .and_then(|d| d.as_str())
            .unwrap_or(error);
        tracing::error!("Token endpoint returned error: {}", desc);
        return match error {
            "invalid_grant" => Err(OAuthError::ExpiredOrRevoked),
            _ => Err(OAuthError::Provider(desc.to_string())),
        };
    }

    serde_json::from_value::<TokenResponse>(resp.clone()).map_err(|_| {
        tracing::error!("Unexpected token response: {:?}", resp);
        OAuthError::BadOauthResponse
    })
}

pub async fn exchange_code(
    http_client: &HttpClient,
    config: &OAuthConfig,
    code: &str,
) -> OAuthResult<TokenResponse> {
    let scope = config.scopes.join(" ");
    post_token_form(
        http_client,
        config,
        &[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("scope", scope.as_str()),
        ],
    )
    .await
}

pub async fn exchange_refresh_token(
    http_client: &HttpClient,
    config: &OAuthConfig,
    refresh_token: &str,
) -> OAuthResult<TokenResponse> {
    let scope = config.scopes.join(" ");
    post_token_form(
        http_client,
        config,
        &[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("scope", scope.as_str()),
        ],
    )
    .await
}

#[derive(Debug, Default, Deserialize)]
struct AccessTokenClaims {
    #[serde(default)]
    idp: Option<String>,
    #[serde(default)]
    tid: Option<String>,
}

/// Whether the bearer token belongs to a personal Microsoft account, which
/// Graph does not grant mail access to. Unreadable tokens are treated as
/// organizational.
pub fn is_personal_account(access_token: &str) -> bool {
    let Some(payload) = access_token.split('.').nth(1) else {
        return false;
    };
    let claims = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()
        .and_then(|bytes| serde_json::from_slice::<AccessTokenClaims>(&bytes).ok());

    match claims {
        Some(claims) => {
            claims.idp.as_deref() == Some("live.com")
                || claims.tid.as_deref() == Some(CONSUMER_TENANT)
        }
        None => {
            tracing::debug!("Could not decode access token claims");
            false
        }
    }
}
