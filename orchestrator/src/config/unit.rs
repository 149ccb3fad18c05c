//! Per-unit configuration as written in the unit TOML files
//!
//! ```toml
//! [units.group-poller]
//! kind = "http_poll"
//! required = true
//! interval_seconds = 60
//! rate_limiter = "remote-api"
//!
//! [units.group-poller.settings]
//! url = "https://api.example.com/groups"
//! timeout_seconds = 10
//! ```
//!
//! The free-form `settings` table is parsed by each unit kind into its own
//! struct, which rejects unknown keys.

use super::invalid;
use crate::constants::units;
use crate::errors::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub kind: String,
    /// Required units are built even when `enabled` is false
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    pub rate_limiter: Option<String>,
    #[serde(default)]
    pub settings: toml::Table,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitConfigFile {
    #[serde(default)]
    pub units: HashMap<String, UnitConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    units::DEFAULT_INTERVAL_SECONDS
}

impl UnitConfig {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            required: false,
            enabled: true,
            interval_seconds: default_interval(),
            rate_limiter: None,
            settings: toml::Table::new(),
        }
    }

    pub fn should_build(&self) -> bool {
        self.required || self.enabled
    }

    /// Deserialize the `settings` table into the kind's typed settings
    pub fn parse_settings<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        toml::Value::Table(self.settings.clone())
            .try_into()
            .map_err(|e| invalid("settings", &e.to_string()))
    }

    pub(crate) fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.kind.trim().is_empty() {
            return Err(invalid(&format!("units.{}.kind", name), "must not be empty"));
        }
        if self.interval_seconds == 0 {
            return Err(invalid(
                &format!("units.{}.interval_seconds", name),
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
