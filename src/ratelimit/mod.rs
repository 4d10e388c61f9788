//! Per-client fixed-window rate limiting.

mod clock;
mod limiter;
mod policy;
mod sweeper;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{RateLimiter, FALLBACK_KEY};
pub use policy::{LimitPolicy, PolicyTable, DEFAULT_LIMIT, DEFAULT_WINDOW_MS};
pub use sweeper::{Sweeper, SweeperHandle};
pub use window::{RateLimitDecision, RateWindow, MAX_WINDOW};
