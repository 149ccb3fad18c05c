use crate::config::RateLimiterConfig;
use crate::constants::rate_limiter as limits;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How strictly the minimum spacing between operations is enforced.
///
/// `Lenient` already permits once 80% of the spacing has elapsed, trading
/// timing precision for throughput. `Strict` waits for the full spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterMode {
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStatus {
    pub name: String,
    pub current_rate: f64,
    pub initial_rate: f64,
    pub period_seconds: f64,
    pub error_backoff: f64,
    pub max_jitter: f64,
    pub mode: LimiterMode,
    pub errors: u64,
    pub consecutive_errors: u64,
    pub successes: u64,
    pub wait_time: f64,
    pub requests_last_hour: usize,
    pub active: bool,
}

#[derive(Debug)]
struct LimiterState {
    current_rate: f64,
    last_used: Option<Instant>,
    total_errors: u64,
    consecutive_errors: u64,
    successes: u64,
    recent_successes: VecDeque<Instant>,
}

impl LimiterState {
    fn fresh(initial_rate: f64) -> Self {
        Self {
            current_rate: initial_rate,
            last_used: None,
            total_errors: 0,
            consecutive_errors: 0,
            successes: 0,
            recent_successes: VecDeque::new(),
        }
    }

    fn prune_window(&mut self, now: Instant) {
        let window = Duration::from_secs(limits::SUCCESS_WINDOW_SECONDS);
        while let Some(oldest) = self.recent_successes.front() {
            if now.saturating_duration_since(*oldest) > window {
                self.recent_successes.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Adaptive per-caller throttle.
///
/// `current_rate` is the number of operations allowed per `period`. It starts
/// at `initial_rate`, is divided by `error_backoff` on every error (never below
/// 0.5) and grows by 10% on every 10th success (never above 3x the initial
/// rate).
pub struct AdaptiveRateLimiter {
    name: String,
    initial_rate: f64,
    period: Duration,
    error_backoff: f64,
    max_jitter: f64,
    mode: LimiterMode,
    state: Mutex<LimiterState>,
}

impl AdaptiveRateLimiter {
    pub fn new(
        name: impl Into<String>,
        initial_rate: f64,
        period: Duration,
        error_backoff: f64,
        max_jitter: f64,
    ) -> Self {
        let name = name.into();
        debug!(
            "Rate limiter '{}' created: {}/{}s, error_backoff={}, max_jitter={}",
            name,
            initial_rate,
            period.as_secs_f64(),
            error_backoff,
            max_jitter
        );

        Self {
            name,
            initial_rate,
            period,
            error_backoff,
            max_jitter,
            mode: LimiterMode::default(),
            state: Mutex::new(LimiterState::fresh(initial_rate)),
        }
    }

    /// Limiter with the stock defaults (10 ops/minute, backoff 1.5)
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(
            name,
            limits::DEFAULT_INITIAL_RATE,
            Duration::from_secs_f64(limits::DEFAULT_PERIOD_SECONDS),
            limits::DEFAULT_ERROR_BACKOFF,
            limits::DEFAULT_MAX_JITTER_SECONDS,
        )
    }

    pub fn from_config(name: &str, config: &RateLimiterConfig) -> Self {
        Self::new(
            name,
            config.initial_rate,
            Duration::from_secs_f64(config.period_seconds),
            config.error_backoff,
            config.max_jitter,
        )
        .with_mode(config.mode)
    }

    pub fn with_mode(mut self, mode: LimiterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> LimiterMode {
        self.mode
    }

    pub fn current_rate(&self) -> f64 {
        self.state.lock().current_rate
    }

    fn spacing(&self, rate: f64) -> Duration {
        Duration::from_secs_f64(self.period.as_secs_f64() / rate)
    }

    // Zero means an operation may run now.
    fn remaining(&self, state: &LimiterState, now: Instant) -> Duration {
        let Some(last_used) = state.last_used else {
            return Duration::ZERO;
        };

        let elapsed = now.saturating_duration_since(last_used);
        if elapsed.as_secs_f64() > self.period.as_secs_f64() * limits::IDLE_RESET_PERIODS {
            return Duration::ZERO;
        }

        let spacing = self.spacing(state.current_rate);
        let threshold = match self.mode {
            LimiterMode::Strict => spacing,
            LimiterMode::Lenient => spacing.mul_f64(limits::LENIENT_THRESHOLD),
        };

        threshold.saturating_sub(elapsed)
    }

    /// Whether an operation may run now. A `true` answer counts as a use and
    /// restarts the spacing window.
    pub fn can_execute(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        if !self.remaining(&state, now).is_zero() {
            return false;
        }

        if let Some(last_used) = state.last_used {
            let elapsed = now.saturating_duration_since(last_used);
            let spacing = self.spacing(state.current_rate);
            if elapsed < spacing {
                warn!(
                    "Rate limiter '{}' permitting early: {:.1}s elapsed (minimum {:.1}s)",
                    self.name,
                    elapsed.as_secs_f64(),
                    spacing.as_secs_f64()
                );
            }
        }

        state.last_used = Some(now);
        true
    }

    /// Time until `can_execute()` would answer `true`
    pub fn get_wait_time(&self) -> Duration {
        let state = self.state.lock();
        self.remaining(&state, Instant::now())
    }

    /// Sleep until the limiter permits, plus a random jitter of up to
    /// `max_jitter` seconds. Does not record a use.
    pub async fn wait_until_ready(&self) {
        let jitter = if self.max_jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..self.max_jitter)
        } else {
            0.0
        };
        let wait = self.get_wait_time() + Duration::from_secs_f64(jitter);

        if !wait.is_zero() {
            debug!(
                "Rate limiter '{}' waiting {:.2}s before next operation",
                self.name,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a successful operation
    pub fn mark_used(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();

        state.last_used = Some(now);
        state.successes += 1;
        state.consecutive_errors = 0;
        state.recent_successes.push_back(now);
        state.prune_window(now);

        if state.successes % limits::RECOVERY_EVERY_SUCCESSES == 0 {
            let ceiling = self.initial_rate * limits::MAX_RATE_MULTIPLIER;
            state.current_rate = (state.current_rate * limits::RECOVERY_FACTOR).min(ceiling);
            debug!(
                "Rate limiter '{}' recovering: {:.2}/{}s",
                self.name,
                state.current_rate,
                self.period.as_secs_f64()
            );
        }
    }

    pub fn mark_success(&self) {
        self.mark_used();
    }

    /// Record a failed operation and slow down
    pub fn register_error(&self, error: Option<&str>) {
        let mut state = self.state.lock();

        state.total_errors += 1;
        state.consecutive_errors += 1;
        state.current_rate = (state.current_rate / self.error_backoff).max(limits::MIN_RATE);

        match error {
            Some(error) => warn!(
                "Rate limiter '{}' error registered ({}): new rate = {:.2}/{}s",
                self.name,
                error,
                state.current_rate,
                self.period.as_secs_f64()
            ),
            None => warn!(
                "Rate limiter '{}' error registered: new rate = {:.2}/{}s",
                self.name,
                state.current_rate,
                self.period.as_secs_f64()
            ),
        }
    }

    pub fn register_failure(&self, error: Option<&str>) {
        self.register_error(error);
    }

    /// Restore the initial rate and forget all history
    pub fn reset(&self) {
        *self.state.lock() = LimiterState::fresh(self.initial_rate);
        info!(
            "Rate limiter '{}' reset: {}/{}s",
            self.name,
            self.initial_rate,
            self.period.as_secs_f64()
        );
    }

    pub fn get_status(&self) -> RateLimiterStatus {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune_window(now);

        let idle_limit = self.period.as_secs_f64() * limits::IDLE_RESET_PERIODS;
        let active = state
            .last_used
            .map(|last| now.saturating_duration_since(last).as_secs_f64() < idle_limit)
            .unwrap_or(false);

        RateLimiterStatus {
            name: self.name.clone(),
            current_rate: state.current_rate,
            initial_rate: self.initial_rate,
            period_seconds: self.period.as_secs_f64(),
            error_backoff: self.error_backoff,
            max_jitter: self.max_jitter,
            mode: self.mode,
            errors: state.total_errors,
            consecutive_errors: state.consecutive_errors,
            successes: state.successes,
            wait_time: self.remaining(&state, now).as_secs_f64(),
            requests_last_hour: state.recent_successes.len(),
            active,
        }
    }
}
