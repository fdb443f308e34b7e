//! Cycle driver
//!
//! Runs the reconciliation cycle on a fixed interval. The first tick fires
//! one interval after `start`; ticks missed while a cycle overruns are
//! skipped rather than bunched up. `stop` cancels future ticks only: a cycle
//! that is already running finishes and records its outcome.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::reconciler::{CycleError, InboxReconciler};
use crate::{prompt::Category, server_config::MIN_POLLING_INTERVAL_SECS};

#[derive(Debug, Display, PartialEq, Eq)]
pub enum DriverError {
    #[display("Interval must be at least {min}s, got {requested}s")]
    IntervalTooShort { requested: u64, min: u64 },
}

impl std::error::Error for DriverError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed {
        processed: usize,
        failed: usize,
        categories: BTreeMap<Category, usize>,
    },
    /// The tick found another cycle in flight
    Skipped,
    Unauthorized {
        message: String,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleState {
    pub running: bool,
    pub interval_seconds: u64,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_outcome: Option<CycleOutcome>,
}

#[derive(Debug)]
struct DriverInner {
    interval_seconds: u64,
    cancel: Option<CancellationToken>,
    // bumped on every start so a replaced loop cannot overwrite the schedule
    generation: u64,
    next_run_time: Option<DateTime<Utc>>,
    last_run_time: Option<DateTime<Utc>>,
    last_run_outcome: Option<CycleOutcome>,
}

#[derive(Clone)]
pub struct CycleDriver {
    reconciler: InboxReconciler,
    default_interval_seconds: u64,
    inner: Arc<Mutex<DriverInner>>,
}

impl CycleDriver {
    pub fn new(reconciler: InboxReconciler, default_interval_seconds: u64) -> Self {
        Self {
            reconciler,
            default_interval_seconds,
            inner: Arc::new(Mutex::new(DriverInner {
                interval_seconds: default_interval_seconds,
                cancel: None,
                generation: 0,
                next_run_time: None,
                last_run_time: None,
                last_run_outcome: None,
            })),
        }
    }

    pub fn default_interval(&self) -> u64 {
        self.default_interval_seconds
    }

    /// Starts ticking every `interval_seconds`. When already running, the
    /// current schedule is replaced by the new one.
    pub fn start(&self, interval_seconds: u64) -> Result<CycleState, DriverError> {
        if interval_seconds < MIN_POLLING_INTERVAL_SECS {
            return Err(DriverError::IntervalTooShort {
                requested: interval_seconds,
                min: MIN_POLLING_INTERVAL_SECS,
            });
        }

        let period = Duration::from_secs(interval_seconds);
        let token = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(previous) = inner.cancel.replace(token.clone()) {
                tracing::info!(
                    "Rescheduling cycle driver from {}s to {}s",
                    inner.interval_seconds,
                    interval_seconds
                );
                previous.cancel();
            }
            inner.generation += 1;
            inner.interval_seconds = interval_seconds;
            inner.next_run_time = Some(wall_clock_after(period));
            inner.generation
        };

        tracing::info!("Cycle driver started (interval: {}s)", interval_seconds);
        let driver = self.clone();
        tokio::spawn(async move { driver.run(token, period, generation).await });

        Ok(self.status())
    }

    pub fn stop(&self) -> CycleState {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.cancel.take() {
                Some(token) => {
                    token.cancel();
                    tracing::info!("Cycle driver stopped");
                }
                None => tracing::debug!("Cycle driver already stopped"),
            }
            inner.next_run_time = None;
        }
        self.status()
    }

    pub fn status(&self) -> CycleState {
        let inner = self.inner.lock().unwrap();
        CycleState {
            running: inner.cancel.is_some(),
            interval_seconds: inner.interval_seconds,
            next_run_time: inner.next_run_time,
            last_run_time: inner.last_run_time,
            last_run_outcome: inner.last_run_outcome.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().cancel.is_some()
    }

    async fn run(&self, token: CancellationToken, period: Duration, generation: u64) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Cycle driver loop {} exiting", generation);
                    break;
                }
                tick_at = ticker.tick() => {
                    self.run_tick().await;

                    let next = next_deadline(tick_at, period, Instant::now());
                    let mut inner = self.inner.lock().unwrap();
                    if inner.generation == generation && !token.is_cancelled() {
                        inner.next_run_time =
                            Some(wall_clock_after(next.saturating_duration_since(Instant::now())));
                    }
                }
            }
        }
    }

    async fn run_tick(&self) {
        let started = Utc::now();
        let outcome = match self.reconciler.run_cycle_once().await {
            Ok(summary) => CycleOutcome::Completed {
                processed: summary.processed,
                failed: summary.failed,
                categories: summary.categories,
            },
            Err(CycleError::AlreadyRunning) => {
                tracing::warn!("Previous cycle still in flight, skipping scheduled tick");
                CycleOutcome::Skipped
            }
            Err(CycleError::Unauthorized(message)) => {
                tracing::error!(
                    "Scheduled cycle needs re-authentication, visit /auth/login: {}",
                    message
                );
                CycleOutcome::Unauthorized { message }
            }
            Err(e) => {
                tracing::error!("Scheduled cycle failed: {}", e);
                CycleOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        let mut inner = self.inner.lock().unwrap();
        inner.last_run_time = Some(started);
        inner.last_run_outcome = Some(outcome);
    }
}

/// The next tick after `tick_at` that is still in the future, matching
/// [`MissedTickBehavior::Skip`].
fn next_deadline(tick_at: Instant, period: Duration, now: Instant) -> Instant {
    let mut next = tick_at + period;
    while next <= now {
        next += period;
    }
    next
}

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}
