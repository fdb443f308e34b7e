use axum::{extract::State, Json};

use crate::{
    error::AppJsonResult,
    state::reconciler::{CycleSummary, InboxReconciler},
};

/// Runs one reconciliation cycle on demand
pub async fn handler_process_new(
    State(reconciler): State<InboxReconciler>,
) -> AppJsonResult<CycleSummary> {
    tracing::info!("Processing new emails on demand");
    let summary = reconciler.run_cycle_once().await?;
    Ok(Json(summary))
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
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;

    fn process_new() -> Request<Body> {
        Request::post("/inbox/process-new")
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_process_new_twice() {
        let now = Utc::now();
        let mut exam = test_message("local-1", Some("<1@x>"), Some(now));
        exam.subject = "Midterm exam room".to_string();
        let mut sale = test_message("local-2", Some("<2@x>"), Some(now));
        sale.subject = "50% discount this week".to_string();
        let state = test_server_state(
            Arc::new(ScriptedMailbox::new(vec![exam, sale])),
            "http://127.0.0.1:9",
        );
        let router = AppRouter::create(state.clone());

        let resp = router.clone().oneshot(process_new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["processed"], 2);
        assert_eq!(body["lastCheck"], Value::Null);
        assert_eq!(body["categories"]["ACADEMIC"], 1);
        assert_eq!(body["categories"]["PROMOTIONAL"], 1);
        assert_eq!(body["emails"][0]["id"], "<1@x>");
        assert!(body["emails"][0]["receivedDateTime"].is_string());

        let resp = router.oneshot(process_new()).await.unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["processed"], 0);
        assert!(body["lastCheck"].is_string());
        assert_eq!(state.reconciler.store().len(), 2);
    }

    #[tokio::test]
    async fn test_process_new_unauthorized() {
        let mailbox = Arc::new(ScriptedMailbox::new(vec![]));
        mailbox.fail_next_fetch(MailboxError::Unauthorized("expired".to_string()));
        let state = test_server_state(mailbox, "http://127.0.0.1:9");

        let resp = AppRouter::create(state).oneshot(process_new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_new_conflict_while_cycle_in_flight() {
        let mailbox = Arc::new(
            ScriptedMailbox::new(vec![]).with_fetch_delay(Duration::from_secs(5)),
        );
        let state = test_server_state(mailbox, "http://127.0.0.1:9");
        let reconciler = state.reconciler.clone();
        let in_flight = tokio::spawn(async move { reconciler.run_cycle_once().await });
        tokio::task::yield_now().await;

        let resp = AppRouter::create(state).oneshot(process_new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(in_flight.await.unwrap().is_ok());
    }
}
