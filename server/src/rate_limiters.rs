use std::sync::atomic::Ordering::Relaxed;
use std::sync::{atomic::AtomicBool, Arc};
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

use crate::server_config::cfg;

const BACKOFF_DURATION: Duration = Duration::from_secs(60);

/// Limits the rate of inference calls across all concurrent classifications
#[derive(Clone)]
pub struct RateLimiters {
    prompt: Arc<RateLimiter>,
    backoff: Arc<AtomicBool>,
    backoff_duration: Duration,
}

impl RateLimiters {
    pub fn new(prompt_limit_per_sec: usize, prompt_interval_ms: usize, prompt_refill: usize) -> Self {
        let prompt = RateLimiter::builder()
            .initial(prompt_limit_per_sec)
            .interval(Duration::from_millis(prompt_interval_ms as u64))
            .max(prompt_limit_per_sec)
            .refill(prompt_refill)
            .build();

        Self {
            prompt: Arc::new(prompt),
            backoff: Arc::new(AtomicBool::new(false)),
            backoff_duration: BACKOFF_DURATION,
        }
    }

    pub fn from_env() -> Self {
        let limits = &cfg.api.prompt_limits;
        Self::new(
            limits.rate_limit_per_sec,
            limits.refill_interval_ms,
            limits.refill_amount,
        )
    }

    pub async fn acquire_one(&self) {
        if self.backoff.load(Relaxed) {
            tokio::time::sleep(self.backoff_duration).await;
        }
        self.prompt.acquire_one().await;
    }

    pub fn trigger_backoff(&self) {
        if self.backoff.swap(true, Relaxed) {
            return;
        }
        tracing::info!("Triggering inference backoff...");
        let self_ = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(self_.backoff_duration).await;
            tracing::info!("Backoff expired");
            self_.backoff.store(false, Relaxed);
        });
    }

    pub fn is_backing_off(&self) -> bool {
        self.backoff.load(Relaxed)
    }

    pub fn get_status(&self) -> String {
        let prompt_bucket = format!("{}/{}", self.prompt.balance(), self.prompt.max());
        if self.is_backing_off() {
            format!("prompts: {} (BACKOFF)", prompt_bucket)
        } else {
            format!("prompts: {}", prompt_bucket)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_within_initial_capacity() {
        let limiters = RateLimiters::new(3, 1_000, 3);
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_millis(100), limiters.acquire_one())
                .await
                .expect("initial capacity should not block");
        }
        assert!(limiters.get_status().starts_with("prompts: 0/3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_expires() {
        let limiters = RateLimiters::new(1, 1_000, 1);
        limiters.trigger_backoff();
        assert!(limiters.is_backing_off());
        assert!(limiters.get_status().ends_with("(BACKOFF)"));

        tokio::time::sleep(BACKOFF_DURATION + Duration::from_secs(1)).await;
        assert!(!limiters.is_backing_off());
    }
}
