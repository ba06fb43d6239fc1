//! Fixed-window rate limiting per logical endpoint.
//!
//! The limiter is the only source of [`Permit`]s, and every dispatch method on
//! [`crate::client::ApiClient`] demands one, so no request can reach the
//! network without being counted.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{RateLimitConfig, WindowLimit};

/// Logical endpoint keys.
pub mod endpoint {
    /// List groups of a tenant.
    pub const LIST_GROUPS: &str = "listGroups";
    /// Create a group.
    pub const CREATE_GROUP: &str = "createGroup";
    /// List one page of items.
    pub const LIST_ITEMS: &str = "listItems";
    /// Create an item.
    pub const CREATE_ITEM: &str = "createItem";
    /// Who-am-i identity check.
    pub const WHO_AM_I: &str = "whoAmI";
}

/// Window accounting for one endpoint key.
#[derive(Debug, Clone)]
struct RateLimitState {
    limit: WindowLimit,
    window_start: Instant,
    count: u32,
}

impl RateLimitState {
    fn new(limit: WindowLimit, now: Instant) -> Self {
        Self {
            limit,
            window_start: now,
            count: 0,
        }
    }

    fn window_end(&self) -> Instant {
        self.window_start + self.limit.window()
    }

    /// Start a new window if the current one has elapsed.
    fn roll(&mut self, now: Instant) {
        if now >= self.window_end() {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.roll(now);
        if self.count < self.limit.ceiling {
            self.count += 1;
            true
        } else {
            false
        }
    }

    fn time_until_reset(&self, now: Instant) -> Duration {
        self.window_end().saturating_duration_since(now)
    }
}

/// Point-in-time view of one endpoint's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    /// Endpoint key.
    pub endpoint_key: String,
    /// Calls counted in the current window.
    pub count: u32,
    /// Configured ceiling.
    pub ceiling: u32,
    /// Time left in the current window, in milliseconds.
    pub resets_in_ms: u64,
}

/// Proof that a call was admitted by the [`RateLimiter`].
///
/// Cannot be constructed outside this module.
#[derive(Debug)]
pub struct Permit {
    endpoint_key: String,
}

impl Permit {
    /// Endpoint key the permit was issued for.
    pub fn endpoint_key(&self) -> &str {
        &self.endpoint_key
    }
}

/// Process-wide limiter shared by every job and resource kind.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    states: Mutex<HashMap<String, RateLimitState>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Count one call against `endpoint_key` if the window has room.
    ///
    /// Returns `false`, without counting anything, once the ceiling is hit.
    pub fn can_proceed(&self, endpoint_key: &str) -> bool {
        self.try_consume(endpoint_key).is_ok()
    }

    /// Suspend until a call to `endpoint_key` is admitted, then count it.
    ///
    /// Dropping the future while it sleeps leaves the window untouched.
    pub async fn wait_until_ready(&self, endpoint_key: &str) {
        loop {
            match self.try_consume(endpoint_key) {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!(
                        endpoint = endpoint_key,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit reached, waiting for window"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Wait for room and hand out a [`Permit`] for one call.
    pub async fn acquire(&self, endpoint_key: &str) -> Permit {
        self.wait_until_ready(endpoint_key).await;
        Permit {
            endpoint_key: endpoint_key.to_string(),
        }
    }

    /// Calls still allowed in the current window.
    pub fn remaining(&self, endpoint_key: &str) -> u32 {
        let now = Instant::now();
        let mut states = self.states.lock();
        let state = self.state_mut(&mut states, endpoint_key, now);
        state.roll(now);
        state.limit.ceiling.saturating_sub(state.count)
    }

    /// Current window state for an endpoint key, if it has been used.
    pub fn snapshot(&self, endpoint_key: &str) -> Option<RateLimitSnapshot> {
        let now = Instant::now();
        let states = self.states.lock();
        states.get(endpoint_key).map(|state| RateLimitSnapshot {
            endpoint_key: endpoint_key.to_string(),
            count: if now >= state.window_end() { 0 } else { state.count },
            ceiling: state.limit.ceiling,
            resets_in_ms: state.time_until_reset(now).as_millis() as u64,
        })
    }

    fn try_consume(&self, endpoint_key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut states = self.states.lock();
        let state = self.state_mut(&mut states, endpoint_key, now);
        if state.try_consume(now) {
            Ok(())
        } else {
            Err(state.time_until_reset(now).max(Duration::from_millis(1)))
        }
    }

    fn state_mut<'a>(
        &self,
        states: &'a mut HashMap<String, RateLimitState>,
        endpoint_key: &str,
        now: Instant,
    ) -> &'a mut RateLimitState {
        states
            .entry(endpoint_key.to_string())
            .or_insert_with(|| RateLimitState::new(self.config.limit_for(endpoint_key), now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(ceiling: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            default: WindowLimit::new(ceiling, window),
            endpoints: HashMap::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_until_window_rolls_over() {
        let limiter = limiter(3, Duration::from_secs(1));

        for _ in 0..3 {
            assert!(limiter.can_proceed(endpoint::CREATE_ITEM));
        }
        assert!(!limiter.can_proceed(endpoint::CREATE_ITEM));
        assert!(!limiter.can_proceed(endpoint::CREATE_ITEM));
        assert_eq!(limiter.remaining(endpoint::CREATE_ITEM), 0);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!limiter.can_proceed(endpoint::CREATE_ITEM));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.can_proceed(endpoint::CREATE_ITEM));
        assert_eq!(limiter.remaining(endpoint::CREATE_ITEM), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(
            RateLimitConfig::default()
                .with_endpoint(endpoint::CREATE_GROUP, WindowLimit::new(1, Duration::from_secs(1))),
        );

        assert!(limiter.can_proceed(endpoint::CREATE_GROUP));
        assert!(!limiter.can_proceed(endpoint::CREATE_GROUP));
        assert!(limiter.can_proceed(endpoint::LIST_GROUPS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_sleeps_to_next_window() {
        let limiter = limiter(1, Duration::from_secs(2));
        let start = Instant::now();

        limiter.wait_until_ready(endpoint::LIST_ITEMS).await;
        limiter.wait_until_ready(endpoint::LIST_ITEMS).await;

        assert!(Instant::now() - start >= Duration::from_secs(2));
        let snapshot = limiter.snapshot(endpoint::LIST_ITEMS).unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.ceiling, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_never_exceed_ceiling() {
        let limiter = Arc::new(limiter(2, Duration::from_secs(1)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let permit = limiter.acquire(endpoint::CREATE_ITEM).await;
                assert_eq!(permit.endpoint_key(), endpoint::CREATE_ITEM);
                Instant::now()
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap() - start);
        }

        for window in 0..3u64 {
            let in_window = admitted
                .iter()
                .filter(|t| t.as_secs() == window)
                .count();
            assert!(in_window <= 2, "window {window} admitted {in_window}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_does_not_consume() {
        let limiter = limiter(1, Duration::from_secs(10));
        assert!(limiter.can_proceed(endpoint::WHO_AM_I));

        let waited = tokio::time::timeout(
            Duration::from_secs(1),
            limiter.wait_until_ready(endpoint::WHO_AM_I),
        )
        .await;
        assert!(waited.is_err());

        let snapshot = limiter.snapshot(endpoint::WHO_AM_I).unwrap();
        assert_eq!(snapshot.count, 1);
    }
}
