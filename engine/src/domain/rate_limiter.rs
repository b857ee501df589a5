//! Rolling-window admission control for outbound lookups.
//!
//! One limiter is shared by every in-flight fetch task. The window lives
//! behind a single mutex so check-and-record is atomic: concurrent callers of
//! [`RateLimiter::try_request`] can never admit more than `max_requests`
//! inside one window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::debug;

use super::Sleeper;

/// Shortest pause between admission retries once the window is full.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Window size and request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Requests admitted per window. Values below one are raised to one.
    pub max_requests: u32,
    /// Length of the rolling window.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 50,
            window: Duration::from_secs(60),
        }
    }
}

/// Rolling-window request counter.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use mockable::DefaultClock;
/// use route_panorama::domain::{RateLimiter, RateLimiterConfig};
///
/// let limiter = RateLimiter::new(
///     RateLimiterConfig { max_requests: 2, window: Duration::from_secs(60) },
///     Arc::new(DefaultClock),
/// );
/// assert!(limiter.try_request());
/// assert!(limiter.try_request());
/// assert!(!limiter.try_request());
/// assert_eq!(limiter.remaining_requests(), 0);
/// ```
pub struct RateLimiter {
    max_requests: u32,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
    timestamps: Mutex<VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    /// Build a limiter reading time from `clock`.
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests: config.max_requests.max(1),
            window: TimeDelta::from_std(config.window).unwrap_or(TimeDelta::MAX),
            clock,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Whether a request would be admitted right now. Does not record.
    pub fn should_allow_request(&self) -> bool {
        let now = self.clock.utc();
        let timestamps = self.pruned(now);
        self.has_capacity(&timestamps)
    }

    /// Record a request at the current time regardless of capacity.
    pub fn record_request(&self) {
        let now = self.clock.utc();
        self.pruned(now).push_back(now);
    }

    /// Atomically admit and record one request, returning whether it was
    /// admitted.
    pub fn try_request(&self) -> bool {
        let now = self.clock.utc();
        let mut timestamps = self.pruned(now);
        if !self.has_capacity(&timestamps) {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Requests still admissible in the current window.
    pub fn remaining_requests(&self) -> u32 {
        self.max_requests.saturating_sub(self.current_usage())
    }

    /// Requests recorded inside the current window.
    pub fn current_usage(&self) -> u32 {
        let now = self.clock.utc();
        u32::try_from(self.pruned(now).len()).unwrap_or(u32::MAX)
    }

    /// Configured request budget per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Time until the oldest recorded request leaves the window; zero when a
    /// slot is already free.
    pub fn time_until_available(&self) -> Duration {
        let now = self.clock.utc();
        let timestamps = self.pruned(now);
        if self.has_capacity(&timestamps) {
            return Duration::ZERO;
        }
        timestamps
            .front()
            .and_then(|oldest| oldest.checked_add_signed(self.window))
            .and_then(|free_at| free_at.signed_duration_since(now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Forget every recorded request.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Wait until a request is admitted, sleeping through `sleeper` while the
    /// window is full. Requests are deferred, never dropped.
    pub async fn acquire(&self, sleeper: &dyn Sleeper) {
        loop {
            if self.try_request() {
                return;
            }
            let wait = self.time_until_available().max(MIN_RETRY_DELAY);
            debug!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "rate limit reached; deferring request"
            );
            sleeper.sleep(wait).await;
        }
    }

    fn has_capacity(&self, timestamps: &VecDeque<DateTime<Utc>>) -> bool {
        u32::try_from(timestamps.len()).unwrap_or(u32::MAX) < self.max_requests
    }

    fn pruned(&self, now: DateTime<Utc>) -> MutexGuard<'_, VecDeque<DateTime<Utc>>> {
        let mut timestamps = self.lock();
        while timestamps
            .front()
            .is_some_and(|oldest| now.signed_duration_since(*oldest) >= self.window)
        {
            timestamps.pop_front();
        }
        timestamps
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DateTime<Utc>>> {
        self.timestamps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
