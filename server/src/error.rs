use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::derive::Display;
use serde_json::json;

use crate::{
    auth::oauth::OAuthError,
    email::client::MailboxError,
    state::{driver::DriverError, reconciler::CycleError},
};

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug, Display)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
    RequestTimeout,
    TooManyRequests,
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        if error.is_timeout() {
            return AppError::RequestTimeout;
        }
        match error.status() {
            Some(StatusCode::BAD_REQUEST) => AppError::BadRequest(error.to_string()),
            Some(StatusCode::REQUEST_TIMEOUT) => AppError::RequestTimeout,
            Some(StatusCode::TOO_MANY_REQUESTS) => AppError::TooManyRequests,
            _ => AppError::Internal(error.into()),
        }
    }
}

impl From<MailboxError> for AppError {
    fn from(error: MailboxError) -> Self {
        match error {
            MailboxError::Unauthorized(_) => AppError::Unauthorized(
                "Access token expired or invalid. Please visit /auth/login to re-authenticate."
                    .to_string(),
            ),
            MailboxError::Timeout => AppError::RequestTimeout,
            other => AppError::Internal(anyhow::anyhow!(
                "Failed to fetch emails from Microsoft Graph: {}",
                other
            )),
        }
    }
}

impl From<CycleError> for AppError {
    fn from(error: CycleError) -> Self {
        match error {
            CycleError::AlreadyRunning => {
                AppError::Conflict("A processing cycle is already in progress".to_string())
            }
            CycleError::Unauthorized(_) => AppError::Unauthorized(
                "Not authenticated. Please visit /auth/login to authenticate with Microsoft."
                    .to_string(),
            ),
            CycleError::Fetch(e) => {
                AppError::Internal(anyhow::anyhow!("Batch processing failed: {}", e))
            }
        }
    }
}

impl From<DriverError> for AppError {
    fn from(error: DriverError) -> Self {
        AppError::BadRequest(error.to_string())
    }
}

impl From<OAuthError> for AppError {
    fn from(error: OAuthError) -> Self {
        match error {
            OAuthError::InvalidState => {
                AppError::BadRequest("Invalid or expired state parameter".to_string())
            }
            OAuthError::MissingCode => {
                AppError::BadRequest("Missing authorization code".to_string())
            }
            OAuthError::ExpiredOrRevoked | OAuthError::NoRefreshToken => AppError::Unauthorized(
                "Authorization expired. Please visit /auth/login to re-authenticate.".to_string(),
            ),
            other => AppError::Internal(anyhow::anyhow!("Token exchange failed: {}", other)),
        }
    }
}

fn error_body(code: StatusCode, message: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({"error": {
        "code": code.as_u16(),
        "message": message.into()
    }}))
}

// This centralizes all different errors from our app in one place
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                error_body(StatusCode::BAD_REQUEST, error),
            ),
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, error_body(StatusCode::NOT_FOUND, msg))
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                )
            }
            AppError::RequestTimeout => (
                StatusCode::REQUEST_TIMEOUT,
                error_body(StatusCode::REQUEST_TIMEOUT, "Request took too long"),
            ),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                error_body(StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
            ),
            AppError::Unauthorized(error) => (
                StatusCode::UNAUTHORIZED,
                error_body(StatusCode::UNAUTHORIZED, error),
            ),
            AppError::Forbidden(error) => (
                StatusCode::FORBIDDEN,
                error_body(StatusCode::FORBIDDEN, error),
            ),
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, error_body(StatusCode::CONFLICT, msg))
            }
        };
        if err.0.is_server_error() {
            tracing::error!("Error: {:?}", err.1);
        } else {
            tracing::warn!("Error: {:?}", err.1);
        }

        err.into_response()
    }
}
