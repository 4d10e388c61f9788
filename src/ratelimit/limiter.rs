//! Core rate limiter implementation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::policy::LimitPolicy;
use super::window::{RateLimitDecision, RateWindow, MAX_WINDOW};

/// Bucket shared by callers that could not produce a client key.
pub const FALLBACK_KEY: &str = "unknown";

/// Fixed-window request counter keyed by client.
///
/// All windows live in one map behind a single lock, so the read, decide
/// and write steps of a check are atomic with respect to every other check
/// and to the sweep. Each check is O(1) and never blocks on I/O.
pub struct RateLimiter {
    /// Open windows indexed by client key
    windows: Mutex<HashMap<String, RateWindow>>,
    /// Time source for window boundaries
    clock: Arc<dyn Clock>,
    /// Limit and window used by `check`
    defaults: LimitPolicy,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a rate limiter that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
            defaults: LimitPolicy::default(),
        }
    }

    /// Replace the limit and window used by `check`.
    pub fn with_defaults(mut self, defaults: LimitPolicy) -> Self {
        self.defaults = defaults;
        self
    }

    /// Check `key` against the default limit and window.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_with(key, self.defaults.limit, self.defaults.window())
    }

    /// Check `key` against a named policy.
    pub fn check_policy(&self, key: &str, policy: &LimitPolicy) -> RateLimitDecision {
        self.check_with(key, policy.limit, policy.window())
    }

    /// Count one request for `key` and report whether it is allowed.
    ///
    /// A zero `limit` is treated as 1. `window` is held between 1ms and
    /// [`MAX_WINDOW`]. An empty key is counted against [`FALLBACK_KEY`].
    pub fn check_with(&self, key: &str, limit: u64, window: Duration) -> RateLimitDecision {
        let key = if key.is_empty() { FALLBACK_KEY } else { key };
        let limit = limit.max(1);
        let window = window.clamp(Duration::from_millis(1), MAX_WINDOW);

        let mut windows = self.windows.lock();
        let now = self.clock.now();

        if let Some(current) = windows.get_mut(key) {
            if !current.is_expired(now) {
                let reset_after = current.remaining_time(now);

                if current.count >= limit {
                    debug!(key = %key, count = current.count, limit = limit, "Rate limit exceeded");
                    return RateLimitDecision {
                        limited: true,
                        remaining: 0,
                        limit,
                        reset_after,
                    };
                }

                current.count += 1;
                trace!(key = %key, count = current.count, limit = limit, "Counted request");
                return RateLimitDecision {
                    limited: false,
                    remaining: limit - current.count,
                    limit,
                    reset_after,
                };
            }
        }

        // No window yet, or the previous one has lapsed
        debug!(
            key = %key,
            limit = limit,
            window_ms = window.as_millis() as u64,
            "Opening rate limit window"
        );
        windows.insert(key.to_string(), RateWindow::open(now, window));

        RateLimitDecision {
            limited: false,
            remaining: limit - 1,
            limit,
            reset_after: window,
        }
    }

    /// Remove every window whose reset point has passed.
    ///
    /// Windows still in progress are left untouched. Returns the number of
    /// entries removed.
    pub fn sweep(&self) -> usize {
        let mut windows = self.windows.lock();
        let now = self.clock.now();

        let before = windows.len();
        windows.retain(|_, window| !window.is_expired(now));
        let removed = before - windows.len();

        trace!(removed = removed, remaining = windows.len(), "Swept rate limit windows");
        removed
    }

    /// Snapshot of the window for `key`, if one is stored.
    ///
    /// Expired windows that have not been swept yet are still returned.
    pub fn window(&self, key: &str) -> Option<RateWindow> {
        self.windows.lock().get(key).copied()
    }

    /// Get the number of stored windows, expired or not.
    pub fn entry_count(&self) -> usize {
        self.windows.lock().len()
    }

    /// Clear all windows.
    pub fn clear(&self) {
        self.windows.lock().clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("entries", &self.entry_count())
            .field("defaults", &self.defaults)
            .finish()
    }
}
