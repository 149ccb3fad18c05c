//! Adaptive rate limiting for calls against throttled remote APIs
//!
//! The limiter collapses fast on errors (divide by the backoff factor) and
//! recovers slowly on success (+10% every 10th success), which suits remote
//! services that throttle per account without documenting their limits.
//!
//! Limiters are advisory: callers ask `can_execute()` or wait on
//! `wait_until_ready()`, nothing is blocked by the limiter itself. A single
//! limiter is shared through the [`LimiterRegistry`] by every unit that talks
//! to the same API.

pub mod limiter;
pub mod registry;

pub use limiter::{AdaptiveRateLimiter, LimiterMode, RateLimiterStatus};
pub use registry::LimiterRegistry;
