//! Central repository for defaults, thresholds and intervals
//!
//! Constants are grouped by the component that consumes them so the
//! numbers that shape runtime behavior live in one place.

use std::time::Duration;

/// Adaptive rate limiter defaults
pub mod rate_limiter {
    /// Operations allowed per period when nothing else is configured
    pub const DEFAULT_INITIAL_RATE: f64 = 10.0;

    /// Length of the rate window in seconds
    pub const DEFAULT_PERIOD_SECONDS: f64 = 60.0;

    /// Divisor applied to the current rate on every registered error
    pub const DEFAULT_ERROR_BACKOFF: f64 = 1.5;

    /// Upper bound of the random delay added by `wait_until_ready`
    pub const DEFAULT_MAX_JITTER_SECONDS: f64 = 1.0;

    /// The rate never drops below this many operations per period
    pub const MIN_RATE: f64 = 0.5;

    /// The rate never grows beyond this multiple of the initial rate
    pub const MAX_RATE_MULTIPLIER: f64 = 3.0;

    /// Every Nth cumulative success raises the rate
    pub const RECOVERY_EVERY_SUCCESSES: u64 = 10;

    /// Growth factor applied on recovery
    pub const RECOVERY_FACTOR: f64 = 1.1;

    /// Fraction of the delay after which lenient mode already permits
    pub const LENIENT_THRESHOLD: f64 = 0.8;

    /// Idle gap (in periods) after which the limiter always permits
    pub const IDLE_RESET_PERIODS: f64 = 5.0;

    /// Size of the rolling success window in seconds
    pub const SUCCESS_WINDOW_SECONDS: u64 = 3600;
}

/// Scheduler defaults
pub mod scheduler {
    /// Concurrent firings allowed for one job
    pub const DEFAULT_MAX_INSTANCES: usize = 1;

    /// Late firings within this window still run (coalesced)
    pub const DEFAULT_MISFIRE_GRACE_SECONDS: u64 = 60;

    /// Upper bound on how long the loop sleeps without re-checking
    pub const MAX_IDLE_SLEEP_SECONDS: u64 = 60;
}

/// Service unit lifecycle defaults
pub mod units {
    /// Default tick interval in seconds
    pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

    /// Budget for a start hook before it counts as a startup failure
    pub const DEFAULT_START_TIMEOUT_SECONDS: u64 = 30;

    /// Budget for a stop hook plus the in-flight tick
    pub const DEFAULT_STOP_TIMEOUT_SECONDS: u64 = 10;

    /// A running unit with this many consecutive tick failures is unhealthy
    pub const UNHEALTHY_AFTER_CONSECUTIVE_ERRORS: u64 = 5;
}

/// Health monitor defaults
pub mod health {
    /// Seconds between status polls
    pub const DEFAULT_STATUS_INTERVAL_SECONDS: u64 = 10;

    /// Units above this error count produce a warning on every poll
    pub const ERROR_WARNING_THRESHOLD: u64 = 5;

    /// Default location of the dashboard snapshot file
    pub const DEFAULT_STATUS_FILE: &str = "runtime/service_status.json";

    /// Health history older than this is purged by the daily cleanup
    pub const DEFAULT_RETENTION_HOURS: i64 = 72;

    /// Hour (scheduler timezone) at which the history cleanup runs
    pub const CLEANUP_HOUR: u32 = 3;
}

/// Control-plane defaults
pub mod web {
    use super::Duration;

    /// How long a control request waits for the operation before answering
    pub const CONTROL_RESPONSE_WAIT: Duration = Duration::from_secs(2);

    /// Default number of health records returned by the history endpoint
    pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
}

/// HTTP client defaults for polling units
pub mod http {
    use super::Duration;

    /// Request timeout when a unit does not configure one
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// Timeout for establishing connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
}
