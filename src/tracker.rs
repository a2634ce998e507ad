//! Shared memo of the remote rate limit, written by fetcher observations
//! and read by the ingestion coordinator.
use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
struct RateLimitState {
    remaining: i64,
    reset_at: DateTime<Utc>,
}

/// Thread-safe `(remaining, reset_at)` record. Holds no business logic.
#[derive(Debug)]
pub struct RateLimitTracker {
    state: Mutex<RateLimitState>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RateLimitState {
                remaining: 0,
                reset_at: DateTime::UNIX_EPOCH,
            }),
        }
    }

    pub fn set(&self, remaining: i64, reset_at: DateTime<Utc>) {
        let mut state = self.state.lock().expect("rate limit tracker poisoned");
        state.remaining = remaining;
        state.reset_at = reset_at;
    }

    pub fn remaining(&self) -> i64 {
        self.state.lock().expect("rate limit tracker poisoned").remaining
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.state.lock().expect("rate limit tracker poisoned").reset_at
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}
