//! Lifecycle wrapper shared by every worker
//!
//! A worker only implements [`UnitHooks`]; [`ServiceUnit`] owns the state
//! machine, the periodic scheduler job, the cancellation token and the error
//! bookkeeping. Hook errors, panics and timeouts never escape a unit: they
//! become log events and status fields.

use crate::constants::units;
use crate::errors::{ConfigError, SchedulerError};
use crate::rate_limiter::AdaptiveRateLimiter;
use crate::scheduler::{JobFn, Scheduler};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Everything a hook gets to see about its unit
#[derive(Clone)]
pub struct UnitContext {
    pub name: String,
    /// Cancelled when the unit stops; a fresh token is minted per start
    pub token: CancellationToken,
    pub limiter: Option<Arc<AdaptiveRateLimiter>>,
}

/// Worker behavior plugged into a [`ServiceUnit`]
#[async_trait]
pub trait UnitHooks: Send + Sync {
    async fn on_start(&self, _ctx: &UnitContext) -> Result<()> {
        Ok(())
    }

    async fn on_stop(&self, _ctx: &UnitContext) -> Result<()> {
        Ok(())
    }

    /// One periodic tick
    async fn on_update(&self, ctx: &UnitContext) -> Result<()>;

    fn as_status_reporter(&self) -> Option<&dyn StatusReporter> {
        None
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        None
    }
}

/// Units that add their own fields to the status output
pub trait StatusReporter: Send + Sync {
    fn extra_status(&self) -> Result<Map<String, Value>>;
}

/// Units that accept runtime configuration changes
pub trait Configurable: Send + Sync {
    fn apply_setting(&self, key: &str, value: &Value) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStatus {
    pub name: String,
    pub kind: String,
    pub state: UnitState,
    pub running: bool,
    pub healthy: bool,
    pub uptime_seconds: u64,
    pub interval_seconds: u64,
    pub error_count: u64,
    pub success_count: u64,
    pub consecutive_errors: u64,
    pub last_error: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub job_id: Option<String>,
    pub rate_limiter: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UnitStatus {
    /// Marks a status whose extension fields could not be collected
    pub fn with_status_error(mut self, reason: &str) -> Self {
        self.extra
            .insert("status_error".to_string(), Value::from(reason));
        self
    }
}

/// Construction options for a [`ServiceUnit`]
#[derive(Clone)]
pub struct UnitOptions {
    pub kind: String,
    pub interval_seconds: u64,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub limiter: Option<Arc<AdaptiveRateLimiter>>,
}

impl Default for UnitOptions {
    fn default() -> Self {
        Self {
            kind: "custom".to_string(),
            interval_seconds: units::DEFAULT_INTERVAL_SECONDS,
            start_timeout: Duration::from_secs(units::DEFAULT_START_TIMEOUT_SECONDS),
            stop_timeout: Duration::from_secs(units::DEFAULT_STOP_TIMEOUT_SECONDS),
            limiter: None,
        }
    }
}

struct UnitRuntime {
    state: UnitState,
    interval_seconds: u64,
    token: CancellationToken,
    job_id: Option<String>,
    error_count: u64,
    success_count: u64,
    consecutive_errors: u64,
    last_error: Option<String>,
    last_run: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    forced_unhealthy: bool,
}

pub struct ServiceUnit {
    name: String,
    kind: String,
    hooks: Arc<dyn UnitHooks>,
    scheduler: Scheduler,
    limiter: Option<Arc<AdaptiveRateLimiter>>,
    start_timeout: Duration,
    stop_timeout: Duration,
    me: Weak<ServiceUnit>,
    // Serializes start/stop/restart/set_interval
    lifecycle: AsyncMutex<()>,
    // Held for the duration of one tick
    update_gate: AsyncMutex<()>,
    runtime: parking_lot::Mutex<UnitRuntime>,
}

impl ServiceUnit {
    pub fn new(
        name: &str,
        hooks: Arc<dyn UnitHooks>,
        scheduler: Scheduler,
        options: UnitOptions,
    ) -> Arc<Self> {
        let token = CancellationToken::new();
        // Never started: no token may be considered live
        token.cancel();

        Arc::new_cyclic(|me| Self {
            name: name.to_string(),
            kind: options.kind,
            hooks,
            scheduler,
            limiter: options.limiter,
            start_timeout: options.start_timeout,
            stop_timeout: options.stop_timeout,
            me: me.clone(),
            lifecycle: AsyncMutex::new(()),
            update_gate: AsyncMutex::new(()),
            runtime: parking_lot::Mutex::new(UnitRuntime {
                state: UnitState::Stopped,
                interval_seconds: options.interval_seconds.max(1),
                token,
                job_id: None,
                error_count: 0,
                success_count: 0,
                consecutive_errors: 0,
                last_error: None,
                last_run: None,
                started_at: None,
                forced_unhealthy: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn state(&self) -> UnitState {
        self.runtime.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == UnitState::Running
    }

    pub fn interval_seconds(&self) -> u64 {
        self.runtime.lock().interval_seconds
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn job_id(&self) -> String {
        format!("unit:{}", self.name)
    }

    /// Token of the current start cycle, cancelled when the unit is not running
    pub fn cancellation_token(&self) -> CancellationToken {
        self.runtime.lock().token.clone()
    }

    fn context(&self, token: CancellationToken) -> UnitContext {
        UnitContext {
            name: self.name.clone(),
            token,
            limiter: self.limiter.clone(),
        }
    }

    fn schedule_updates(&self, interval_seconds: u64) -> Result<String, SchedulerError> {
        let job_id = self.job_id();
        let unit = self.me.clone();
        let job = JobFn::new(format!("{}.update", self.name), move || {
            let unit = unit.clone();
            async move {
                if let Some(unit) = unit.upgrade() {
                    unit.update().await;
                }
            }
        });

        // One periodic job per unit, whatever happened before
        self.scheduler.remove_job(&job_id);
        self.scheduler
            .add_interval_job(job, interval_seconds, 0, 0, Some(&job_id))
    }

    /// Schedules ticks for the start cycle owning `token`. Returns `None`
    /// when a concurrent stop cancelled that cycle; no job is left behind.
    fn schedule_for(
        &self,
        token: &CancellationToken,
        interval_seconds: u64,
    ) -> Result<Option<String>, SchedulerError> {
        if token.is_cancelled() {
            return Ok(None);
        }
        let job_id = self.schedule_updates(interval_seconds)?;
        if token.is_cancelled() {
            self.scheduler.remove_job(&job_id);
            return Ok(None);
        }
        Ok(Some(job_id))
    }

    /// Start the unit. Returns true when it is running afterwards.
    #[instrument(skip(self), fields(unit = %self.name))]
    pub async fn start(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;

        let token = {
            let mut rt = self.runtime.lock();
            if rt.state == UnitState::Running {
                debug!("Unit {} already running", self.name);
                return true;
            }
            rt.state = UnitState::Starting;
            rt.token = CancellationToken::new();
            rt.forced_unhealthy = false;
            rt.token.clone()
        };

        info!("Starting unit {}", self.name);
        let ctx = self.context(token.clone());
        let outcome = timeout(
            self.start_timeout,
            AssertUnwindSafe(self.hooks.on_start(&ctx)).catch_unwind(),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(format!("{:#}", e)),
            Ok(Err(panic)) => Some(format!("start hook panicked: {}", panic_message(&*panic))),
            Err(_) => Some(format!(
                "start hook timed out after {}s",
                self.start_timeout.as_secs()
            )),
        };

        if let Some(reason) = failure {
            token.cancel();
            let mut rt = self.runtime.lock();
            rt.state = UnitState::Failed;
            rt.error_count += 1;
            rt.last_error = Some(format!("StartupFailure: {}", reason));
            error!("✗ Failed to start unit {}: {}", self.name, reason);
            return false;
        }

        let interval = self.runtime.lock().interval_seconds;
        match self.schedule_for(&token, interval) {
            Ok(Some(job_id)) => {
                let mut rt = self.runtime.lock();
                if rt.token.is_cancelled() {
                    drop(rt);
                    self.scheduler.remove_job(&job_id);
                    warn!("Unit {} was stopped while starting", self.name);
                    return false;
                }
                rt.state = UnitState::Running;
                rt.job_id = Some(job_id);
                rt.started_at = Some(Utc::now());
                info!("✓ Unit {} running every {}s", self.name, interval);
                true
            }
            Ok(None) => {
                // stop() gave up waiting for us and already forced the unit down
                warn!("Unit {} was stopped while starting", self.name);
                false
            }
            Err(e) => {
                token.cancel();
                self.run_stop_hook(&ctx, Instant::now() + self.stop_timeout)
                    .await;
                let mut rt = self.runtime.lock();
                rt.state = UnitState::Failed;
                rt.error_count += 1;
                rt.last_error = Some(format!("StartupFailure: {}", e));
                error!("✗ Failed to schedule unit {}: {}", self.name, e);
                false
            }
        }
    }

    /// Stop the unit within `budget`. The unit is not running afterwards
    /// whatever the hooks do; returns false when the budget ran out.
    #[instrument(skip(self), fields(unit = %self.name))]
    pub async fn stop(&self, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;

        // Cancel before removing: a racing schedule_for() either sees the
        // cancel or has its job removed here. No tick starts after this.
        self.runtime.lock().token.cancel();
        self.scheduler.remove_job(&self.job_id());

        let _lifecycle = match tokio::time::timeout_at(deadline, self.lifecycle.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                self.force_stopped(true, "lifecycle operation still in progress");
                return false;
            }
        };

        let token = {
            let mut rt = self.runtime.lock();
            match rt.state {
                UnitState::Stopped | UnitState::Failed => {
                    debug!("Unit {} not running, nothing to stop", self.name);
                    return true;
                }
                _ => {}
            }
            rt.state = UnitState::Stopping;
            rt.token.clone()
        };

        info!("Stopping unit {}", self.name);
        token.cancel();
        let ctx = self.context(token);

        let mut timed_out = !self.run_stop_hook(&ctx, deadline).await;
        if !timed_out && tokio::time::timeout_at(deadline, self.update_gate.lock()).await.is_err() {
            timed_out = true;
        }

        self.force_stopped(timed_out, "stop hook or in-flight tick exceeded the budget");
        !timed_out
    }

    /// Runs the stop hook until `deadline`. Hook errors are logged; returns
    /// false only when the deadline passed.
    async fn run_stop_hook(&self, ctx: &UnitContext, deadline: Instant) -> bool {
        match tokio::time::timeout_at(
            deadline,
            AssertUnwindSafe(self.hooks.on_stop(ctx)).catch_unwind(),
        )
        .await
        {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                warn!("Stop hook of unit {} failed: {:#}", self.name, e);
                true
            }
            Ok(Err(panic)) => {
                error!(
                    "Stop hook of unit {} panicked: {}",
                    self.name,
                    panic_message(&*panic)
                );
                true
            }
            Err(_) => {
                warn!("Stop hook of unit {} exceeded its budget", self.name);
                false
            }
        }
    }

    fn force_stopped(&self, timed_out: bool, reason: &str) {
        // Covers a job re-added by a lifecycle call racing with stop()
        self.scheduler.remove_job(&self.job_id());
        let mut rt = self.runtime.lock();
        rt.token.cancel();
        rt.state = UnitState::Stopped;
        rt.job_id = None;
        rt.started_at = None;
        if timed_out {
            rt.forced_unhealthy = true;
            rt.error_count += 1;
            rt.last_error = Some(format!("ShutdownTimeout: {}", reason));
            warn!("Unit {} force-stopped: {}", self.name, reason);
        } else {
            info!("✓ Unit {} stopped", self.name);
        }
    }

    /// Stop and start again with a fresh token
    #[instrument(skip(self), fields(unit = %self.name))]
    pub async fn restart(&self) -> bool {
        self.stop(self.stop_timeout).await;
        self.start().await
    }

    /// One scheduled tick
    pub async fn update(&self) {
        let token = {
            let rt = self.runtime.lock();
            if rt.state != UnitState::Running {
                return;
            }
            rt.token.clone()
        };
        if token.is_cancelled() {
            return;
        }

        let Ok(_gate) = self.update_gate.try_lock() else {
            debug!("Previous tick of unit {} still running", self.name);
            return;
        };

        let ctx = self.context(token.clone());
        let outcome = AssertUnwindSafe(self.hooks.on_update(&ctx))
            .catch_unwind()
            .await;

        let mut rt = self.runtime.lock();
        rt.last_run = Some(Utc::now());
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(panic) => Some(format!("update panicked: {}", panic_message(&*panic))),
        };

        match failure {
            None => {
                rt.success_count += 1;
                rt.consecutive_errors = 0;
            }
            Some(_) if token.is_cancelled() => {
                debug!("Tick of unit {} interrupted by stop", self.name);
            }
            Some(reason) => {
                rt.error_count += 1;
                rt.consecutive_errors += 1;
                rt.last_error = Some(reason.clone());
                error!(
                    "Tick of unit {} failed ({} in a row): {}",
                    self.name, rt.consecutive_errors, reason
                );
            }
        }
    }

    /// Change the tick interval; a running unit keeps exactly one job
    #[instrument(skip(self), fields(unit = %self.name))]
    pub async fn set_interval(&self, seconds: u64) -> Result<(), ConfigError> {
        if seconds < 1 {
            return Err(ConfigError::InvalidValue {
                field: "interval_seconds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let _lifecycle = self.lifecycle.lock().await;
        let live_token = {
            let mut rt = self.runtime.lock();
            rt.interval_seconds = seconds;
            (rt.state == UnitState::Running).then(|| rt.token.clone())
        };

        if let Some(token) = live_token {
            let scheduled = self
                .schedule_for(&token, seconds)
                .map_err(|e| ConfigError::InvalidValue {
                    field: "interval_seconds".to_string(),
                    reason: e.to_string(),
                })?;
            if let Some(job_id) = scheduled {
                self.runtime.lock().job_id = Some(job_id);
            }
        }

        info!("Unit {} interval set to {}s", self.name, seconds);
        Ok(())
    }

    /// Apply one configuration key
    pub async fn apply_config(&self, key: &str, value: &Value) -> Result<(), ConfigError> {
        if key == "interval_seconds" {
            let seconds = value.as_u64().ok_or_else(|| ConfigError::InvalidValue {
                field: key.to_string(),
                reason: format!("expected a positive integer, got {}", value),
            })?;
            return self.set_interval(seconds).await;
        }

        match self.hooks.as_configurable() {
            Some(configurable) => configurable.apply_setting(key, value),
            None => Err(ConfigError::UnknownKey {
                key: key.to_string(),
            }),
        }
    }

    /// Lifecycle fields plus whatever the worker reports about itself.
    /// Fails when the worker's own status report fails.
    pub fn get_status(&self) -> Result<UnitStatus> {
        let extra = match self.hooks.as_status_reporter() {
            Some(reporter) => reporter.extra_status()?,
            None => Map::new(),
        };

        let mut status = self.base_status();
        status.extra = extra;
        Ok(status)
    }

    /// Lifecycle fields only; never fails
    pub fn base_status(&self) -> UnitStatus {
        let rt = self.runtime.lock();
        let running = rt.state == UnitState::Running;
        let uptime_seconds = rt
            .started_at
            .filter(|_| running)
            .map(|started| (Utc::now() - started).num_seconds().max(0) as u64)
            .unwrap_or(0);

        UnitStatus {
            name: self.name.clone(),
            kind: self.kind.clone(),
            state: rt.state,
            running,
            healthy: running
                && !rt.forced_unhealthy
                && rt.consecutive_errors < units::UNHEALTHY_AFTER_CONSECUTIVE_ERRORS,
            uptime_seconds,
            interval_seconds: rt.interval_seconds,
            error_count: rt.error_count,
            success_count: rt.success_count,
            consecutive_errors: rt.consecutive_errors,
            last_error: rt.last_error.clone(),
            last_run: rt.last_run,
            started_at: rt.started_at,
            job_id: rt.job_id.clone(),
            rate_limiter: self.limiter.as_ref().map(|l| l.name().to_string()),
            extra: Map::new(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
