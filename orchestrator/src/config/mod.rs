// File: orchestrator/src/config/mod.rs
pub mod manager;
pub mod unit;

use crate::constants::{health, rate_limiter, scheduler, units};
use crate::errors::ConfigError;
use crate::rate_limiter::LimiterMode;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use manager::ConfigManager;
pub use unit::{UnitConfig, UnitConfigFile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_status_interval")]
    pub status_interval_seconds: u64,
    #[serde(default)]
    pub auto_restart_services: bool,
    #[serde(default = "default_status_file")]
    pub status_file: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_start_timeout")]
    pub start_timeout_seconds: u64,
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,
    #[serde(default = "default_retention_hours")]
    pub health_retention_hours: i64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rate_limiters: HashMap<String, RateLimiterConfig>,
    // Populated from the individual unit config files
    #[serde(skip)]
    pub units: HashMap<String, UnitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_misfire_grace")]
    pub misfire_grace_seconds: u64,
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default = "default_initial_rate")]
    pub initial_rate: f64,
    #[serde(default = "default_period")]
    pub period_seconds: f64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff: f64,
    #[serde(default = "default_max_jitter")]
    pub max_jitter: f64,
    #[serde(default)]
    pub mode: LimiterMode,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8095
}

fn default_status_interval() -> u64 {
    health::DEFAULT_STATUS_INTERVAL_SECONDS
}

fn default_status_file() -> String {
    health::DEFAULT_STATUS_FILE.to_string()
}

fn default_database_path() -> String {
    "data/orchestrator.db".to_string()
}

fn default_start_timeout() -> u64 {
    units::DEFAULT_START_TIMEOUT_SECONDS
}

fn default_stop_timeout() -> u64 {
    units::DEFAULT_STOP_TIMEOUT_SECONDS
}

fn default_retention_hours() -> i64 {
    health::DEFAULT_RETENTION_HOURS
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_misfire_grace() -> u64 {
    scheduler::DEFAULT_MISFIRE_GRACE_SECONDS
}

fn default_max_instances() -> usize {
    scheduler::DEFAULT_MAX_INSTANCES
}

fn default_initial_rate() -> f64 {
    rate_limiter::DEFAULT_INITIAL_RATE
}

fn default_period() -> f64 {
    rate_limiter::DEFAULT_PERIOD_SECONDS
}

fn default_error_backoff() -> f64 {
    rate_limiter::DEFAULT_ERROR_BACKOFF
}

fn default_max_jitter() -> f64 {
    rate_limiter::DEFAULT_MAX_JITTER_SECONDS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            status_interval_seconds: default_status_interval(),
            auto_restart_services: false,
            status_file: default_status_file(),
            database_path: default_database_path(),
            start_timeout_seconds: default_start_timeout(),
            stop_timeout_seconds: default_stop_timeout(),
            health_retention_hours: default_retention_hours(),
            scheduler: SchedulerConfig::default(),
            rate_limiters: HashMap::new(),
            units: HashMap::new(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            misfire_grace_seconds: default_misfire_grace(),
            max_instances: default_max_instances(),
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            initial_rate: default_initial_rate(),
            period_seconds: default_period(),
            error_backoff: default_error_backoff(),
            max_jitter: default_max_jitter(),
            mode: LimiterMode::default(),
        }
    }
}

impl Config {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_seconds)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }

    /// Check cross-field constraints after all files are merged
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_interval_seconds == 0 {
            return Err(invalid("status_interval_seconds", "must be at least 1"));
        }
        if self.stop_timeout_seconds == 0 {
            return Err(invalid("stop_timeout_seconds", "must be at least 1"));
        }
        if self.start_timeout_seconds == 0 {
            return Err(invalid("start_timeout_seconds", "must be at least 1"));
        }

        self.scheduler.validate()?;

        for (name, limiter) in &self.rate_limiters {
            limiter.validate(name)?;
        }

        for (name, unit) in &self.units {
            unit.validate(name)?;
            if let Some(limiter) = &unit.rate_limiter {
                if !self.rate_limiters.contains_key(limiter) {
                    return Err(invalid(
                        &format!("units.{}.rate_limiter", name),
                        &format!("unknown rate limiter '{}'", limiter),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl SchedulerConfig {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| invalid("scheduler.timezone", &e.to_string()))
    }

    pub fn misfire_grace(&self) -> Duration {
        Duration::from_secs(self.misfire_grace_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        if self.max_instances == 0 {
            return Err(invalid("scheduler.max_instances", "must be at least 1"));
        }
        if self.misfire_grace_seconds == 0 {
            return Err(invalid(
                "scheduler.misfire_grace_seconds",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl RateLimiterConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        // The rate may back off to MIN_RATE and grow to 3x the initial one
        let lowest_initial = rate_limiter::MIN_RATE / rate_limiter::MAX_RATE_MULTIPLIER;
        if !self.initial_rate.is_finite() || self.initial_rate < lowest_initial {
            return Err(invalid(
                &format!("rate_limiters.{}.initial_rate", name),
                &format!("must be a finite number of at least {:.3}", lowest_initial),
            ));
        }
        if !self.period_seconds.is_finite() || self.period_seconds <= 0.0 {
            return Err(invalid(
                &format!("rate_limiters.{}.period_seconds", name),
                "must be a finite positive number",
            ));
        }
        if !self.error_backoff.is_finite() || self.error_backoff <= 1.0 {
            return Err(invalid(
                &format!("rate_limiters.{}.error_backoff", name),
                "must be greater than 1",
            ));
        }
        if !self.max_jitter.is_finite() || self.max_jitter < 0.0 {
            return Err(invalid(
                &format!("rate_limiters.{}.max_jitter", name),
                "must be finite and not negative",
            ));
        }
        Ok(())
    }
}

pub(crate) fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
