use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::{oauth::is_personal_account, CredentialProvider, TokenStore},
    email::client::MailboxGateway,
    error::{AppError, AppJsonResult},
};

const MAX_FETCH_TOP: u32 = 50;

fn default_top() -> u32 {
    10
}

fn default_folder() -> String {
    "inbox".to_string()
}

#[derive(Debug, Deserialize)]
pub struct FetchParams {
    #[serde(default = "default_top")]
    top: u32,
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_folder")]
    folder: String,
}

pub async fn handler_graph_fetch(
    State(mailbox): State<Arc<dyn MailboxGateway>>,
    State(token_store): State<TokenStore>,
    Query(params): Query<FetchParams>,
) -> AppJsonResult<Value> {
    if !(1..=MAX_FETCH_TOP).contains(&params.top) {
        return Err(AppError::BadRequest(format!(
            "top must be between 1 and {}",
            MAX_FETCH_TOP
        )));
    }

    if let Some(token) = token_store.get_valid_access_token() {
        if is_personal_account(&token) {
            tracing::warn!("Personal Microsoft account detected, Graph mail access not supported");
            return Err(AppError::Forbidden(
                "Personal Microsoft accounts (outlook.com, hotmail.com) are not supported. \
                 Please use an organizational account."
                    .to_string(),
            ));
        }
    }

    let page = mailbox
        .fetch(&params.folder, params.top, params.skip)
        .await?;

    Ok(Json(json!({
        "count": page.messages.len(),
        "hasMore": page.has_more,
        "messages": page.messages,
    })))
}

#[cfg(test)]
mod tests {
    use crate::{
        email::client::MailboxError,
        routes::AppRouter,
        testing::common::{test_message, test_server_state, ScriptedMailbox},
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn get(mailbox: Arc<ScriptedMailbox>, uri: &str) -> (StatusCode, Value) {
        let state = test_server_state(mailbox, "http://127.0.0.1:9");
        let resp = AppRouter::create(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_fetch_pages_through_mailbox() {
        let messages = (0..5)
            .map(|i| test_message(&format!("local-{i}"), Some(&format!("<{i}@x>")), None))
            .collect();
        let (status, body) = get(
            Arc::new(ScriptedMailbox::new(messages)),
            "/graph/fetch?top=2&skip=1",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["hasMore"], true);
        assert_eq!(body["messages"][0]["id"], "local-1");
        assert_eq!(body["messages"][0]["internetMessageId"], "<1@x>");
    }

    #[tokio::test]
    async fn test_fetch_rejects_out_of_range_top() {
        let (status, _) = get(Arc::new(ScriptedMailbox::new(vec![])), "/graph/fetch?top=51").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(Arc::new(ScriptedMailbox::new(vec![])), "/graph/fetch?top=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fetch_unauthorized_is_401() {
        let mailbox = Arc::new(ScriptedMailbox::new(vec![]));
        mailbox.fail_next_fetch(MailboxError::Unauthorized("no token".to_string()));
        let (status, body) = get(mailbox, "/graph/fetch").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], 401);
    }

    #[tokio::test]
    async fn test_fetch_provider_failure_is_500() {
        let mailbox = Arc::new(ScriptedMailbox::new(vec![]));
        mailbox.fail_next_fetch(MailboxError::Network("reset".to_string()));
        let (status, _) = get(mailbox, "/graph/fetch").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
