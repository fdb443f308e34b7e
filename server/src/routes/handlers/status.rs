use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::TokenStore,
    prompt::ClassificationEngine,
    rate_limiters::RateLimiters,
    state::{CycleDriver, InboxReconciler},
    util::to_iso_z,
};

pub async fn handler_root(
    State(token_store): State<TokenStore>,
    State(reconciler): State<InboxReconciler>,
    State(driver): State<CycleDriver>,
) -> Json<Value> {
    let store = reconciler.store();
    let stats = json!({
        "totalProcessed": store.len(),
        "lastCheckTime": store.watermark().map(to_iso_z),
        "categoryDistribution": store.category_distribution(),
    });

    let Some(token) = token_store.current() else {
        return Json(json!({
            "message": "Welcome to Mailsort",
            "authenticated": false,
            "processingStats": stats,
            "schedulerRunning": driver.is_running(),
            "nextSteps": ["Visit /auth/login to authenticate with Microsoft"],
        }));
    };

    Json(json!({
        "message": "Authentication successful!",
        "authenticated": token_store.is_authenticated(),
        "tokenExpiresAt": to_iso_z(token.expires_at),
        "tokenExpired": token.is_expired(),
        "hasRefreshToken": token.refresh_token.is_some(),
        "processingStats": stats,
        "schedulerRunning": driver.is_running(),
        "nextSteps": [
            "Use GET /graph/fetch to fetch emails from inbox",
            "Use POST /classify to classify an email",
            "Use POST /inbox/process-new to process new emails",
            "Use GET /debug/processed to view all processed emails",
        ],
    }))
}

pub async fn handler_health(
    State(engine): State<ClassificationEngine>,
    State(rate_limiters): State<RateLimiters>,
) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": to_iso_z(Utc::now()),
        "classifier": if engine.uses_inference() { "azure-openai" } else { "keywords" },
        "rateLimits": rate_limiters.get_status(),
    }))
}

pub async fn handler_debug_processed(State(reconciler): State<InboxReconciler>) -> Json<Value> {
    let store = reconciler.store();
    Json(json!({
        "count": store.len(),
        "lastCheckTime": store.watermark().map(to_iso_z),
        "emails": store.entries(),
    }))
}
