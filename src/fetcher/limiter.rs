//! Sliding-window rate limiter simulating the quota the remote API enforces.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AppError;

/// Keeps one expiry timestamp per admitted request. A request is admitted
/// while fewer than `limit` timestamps are still live; each admission books
/// a new slot that expires a full window later.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: chrono::Duration,
    expiries: Mutex<VecDeque<DateTime<Utc>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero()),
            expiries: Mutex::new(VecDeque::new()),
        }
    }

    /// Admits or refuses one request, booking a slot on admission.
    pub fn check(&self) -> Result<(), AppError> {
        let mut expiries = self.expiries.lock().expect("rate limiter poisoned");
        let now = Utc::now();

        Self::purge(&mut expiries, now);

        if expiries.len() >= self.limit {
            return Err(AppError::RateLimited);
        }

        expiries.push_back(now + self.window);
        Ok(())
    }

    /// Returns `(remaining, reset_at)` the way the remote would report them:
    /// calls left in the window, and the earliest time a slot frees up.
    pub fn snapshot(&self) -> (i64, DateTime<Utc>) {
        let mut expiries = self.expiries.lock().expect("rate limiter poisoned");
        let now = Utc::now();

        Self::purge(&mut expiries, now);

        let remaining = self.limit.saturating_sub(expiries.len()) as i64;
        let reset_at = expiries.front().copied().unwrap_or(now);
        (remaining, reset_at)
    }

    fn purge(expiries: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while expiries.front().is_some_and(|expiry| *expiry < now) {
            expiries.pop_front();
        }
    }
}
