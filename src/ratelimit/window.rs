//! Per-key window state and check results.

use std::time::{Duration, Instant};

/// Longest window a key can be held to.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A fixed window of request counts for one client key.
///
/// The boundary is set when the window opens and never moves; rejected
/// requests do not extend it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests observed in this window (always at least 1)
    pub count: u64,
    /// When this window stops applying
    pub reset_at: Instant,
}

impl RateWindow {
    /// Open a new window at `now` with the first request already counted.
    ///
    /// Lengths beyond [`MAX_WINDOW`] are cut down to it.
    pub fn open(now: Instant, length: Duration) -> Self {
        let length = length.min(MAX_WINDOW);
        Self {
            count: 1,
            reset_at: now.checked_add(length).unwrap_or(now),
        }
    }

    /// Whether `now` has reached the reset point.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }

    /// Time left until the window resets.
    pub fn remaining_time(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request must be throttled
    pub limited: bool,
    /// Requests still allowed in the current window
    pub remaining: u64,
    /// The limit the check was evaluated against
    pub limit: u64,
    /// Time until the key's window resets
    pub reset_after: Duration,
}
