use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppJsonResult},
    server_config::{MAX_POLLING_INTERVAL_SECS, MIN_POLLING_INTERVAL_SECS},
    state::{CycleDriver, CycleState},
};

#[derive(Debug, Deserialize)]
pub struct StartParams {
    interval: Option<u64>,
}

pub async fn handler_start(
    State(driver): State<CycleDriver>,
    Query(params): Query<StartParams>,
) -> AppJsonResult<Value> {
    let interval = params.interval.unwrap_or_else(|| driver.default_interval());
    if !(MIN_POLLING_INTERVAL_SECS..=MAX_POLLING_INTERVAL_SECS).contains(&interval) {
        return Err(AppError::BadRequest(format!(
            "interval must be between {} and {} seconds",
            MIN_POLLING_INTERVAL_SECS, MAX_POLLING_INTERVAL_SECS
        )));
    }

    tracing::info!("Starting scheduler with interval={}s", interval);
    let state = driver.start(interval)?;
    Ok(Json(json!({
        "message": format!("Scheduler started, processing every {}s", interval),
        "scheduler": state,
    })))
}

pub async fn handler_stop(State(driver): State<CycleDriver>) -> Json<Value> {
    let was_running = driver.is_running();
    let state = driver.stop();
    let message = if was_running {
        "Scheduler stopped"
    } else {
        "Scheduler was not running"
    };
    Json(json!({ "message": message, "scheduler": state }))
}

pub async fn handler_status(State(driver): State<CycleDriver>) -> Json<CycleState> {
    Json(driver.status())
}
