use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::Utc;
use uuid::Uuid;

/// Pending OAuth `state` values issued by `/auth/login`.
/// Each one is accepted at most once by the callback.
#[derive(Debug, Clone)]
pub struct AuthStateStore {
    inner: Arc<RwLock<HashMap<Uuid, i64>>>,
    ttl_secs: i64,
}

impl AuthStateStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    /// Issue a fresh state value
    pub fn issue(&self) -> Uuid {
        let state = Uuid::new_v4();
        self.inner
            .write()
            .unwrap()
            .insert(state, Utc::now().timestamp() + self.ttl_secs);
        state
    }

    /// Remove `state` and report whether it was issued and is still live
    pub fn consume(&self, state: &str) -> bool {
        let Ok(state) = Uuid::parse_str(state) else {
            return false;
        };
        match self.inner.write().unwrap().remove(&state) {
            Some(expires_at) => expires_at > Utc::now().timestamp(),
            None => false,
        }
    }

    /// Drop expired states. Returns how many were removed.
    pub fn clean_store(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut inner = self.inner.write().unwrap();
        let before = inner.len();
        inner.retain(|_, expires_at| *expires_at > now);
        let removed = before - inner.len();
        if removed > 0 {
            tracing::info!("Cleaned up {} expired state tokens", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}
