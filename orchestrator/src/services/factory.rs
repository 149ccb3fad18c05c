use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::heartbeat::{HeartbeatSettings, HeartbeatUnit};
use super::http_poll::{HttpPollSettings, HttpPollUnit};
use super::unit::{ServiceUnit, UnitHooks, UnitOptions};
use crate::config::{Config, UnitConfig};
use crate::constants::http::CONNECT_TIMEOUT;
use crate::errors::{OrchestratorError, ServiceError};
use crate::rate_limiter::LimiterRegistry;
use crate::scheduler::Scheduler;

/// What a kind builder gets to construct its hooks from
pub struct BuildContext<'a> {
    pub name: &'a str,
    pub config: &'a UnitConfig,
    pub client: &'a Client,
}

pub type UnitBuilder = Arc<dyn Fn(&BuildContext<'_>) -> Result<Arc<dyn UnitHooks>> + Send + Sync>;

/// Persisted per-unit overrides: unit name -> key -> value
pub type ConfigOverrides = HashMap<String, HashMap<String, Value>>;

pub struct ServiceFactory {
    config: Arc<Config>,
    scheduler: Scheduler,
    limiters: Arc<LimiterRegistry>,
    client: Client,
    kinds: HashMap<String, UnitBuilder>,
    overrides: ConfigOverrides,
}

impl ServiceFactory {
    pub fn new(
        config: Arc<Config>,
        scheduler: Scheduler,
        limiters: Arc<LimiterRegistry>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        let mut factory = Self {
            config,
            scheduler,
            limiters,
            client,
            kinds: HashMap::new(),
            overrides: HashMap::new(),
        };

        factory.register_kind("heartbeat", |ctx| {
            let settings: HeartbeatSettings = ctx.config.parse_settings()?;
            Ok(Arc::new(HeartbeatUnit::new(settings)) as Arc<dyn UnitHooks>)
        });
        factory.register_kind("http_poll", |ctx| {
            let settings: HttpPollSettings = ctx.config.parse_settings()?;
            Ok(Arc::new(HttpPollUnit::new(ctx.client.clone(), settings)?) as Arc<dyn UnitHooks>)
        });

        Ok(factory)
    }

    /// Make a unit kind available to `[units.*]` tables by name
    pub fn register_kind<F>(&mut self, kind: &str, builder: F)
    where
        F: Fn(&BuildContext<'_>) -> Result<Arc<dyn UnitHooks>> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.to_string(), Arc::new(builder));
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.kinds.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Build every required unit plus the enabled optional ones. A unit that
    /// fails to build is logged and left out.
    pub async fn build(&self) -> HashMap<String, Arc<ServiceUnit>> {
        let mut built = HashMap::new();

        for (name, unit_config) in &self.config.units {
            if !unit_config.should_build() {
                info!("Unit {} disabled, skipping", name);
                continue;
            }

            match self.build_unit(name, unit_config) {
                Ok(unit) => {
                    self.apply_overrides(&unit).await;
                    built.insert(name.clone(), unit);
                }
                Err(e) => {
                    if unit_config.required {
                        error!("✗ Required unit {} could not be built: {}", name, e);
                    } else {
                        warn!("✗ Optional unit {} could not be built: {}", name, e);
                    }
                }
            }
        }

        info!(
            "Built {} of {} configured units",
            built.len(),
            self.config.units.len()
        );
        built
    }

    pub fn build_unit(
        &self,
        name: &str,
        unit_config: &UnitConfig,
    ) -> Result<Arc<ServiceUnit>, OrchestratorError> {
        let builder = self.kinds.get(&unit_config.kind).ok_or_else(|| {
            ServiceError::ConstructionFailed {
                name: name.to_string(),
                reason: format!("unknown unit kind '{}'", unit_config.kind),
            }
        })?;

        let limiter = match &unit_config.rate_limiter {
            Some(limiter_name) => Some(self.limiters.get(limiter_name).ok_or_else(|| {
                ServiceError::ConstructionFailed {
                    name: name.to_string(),
                    reason: format!("unknown rate limiter '{}'", limiter_name),
                }
            })?),
            None => None,
        };

        let ctx = BuildContext {
            name,
            config: unit_config,
            client: &self.client,
        };
        let hooks = builder(&ctx).map_err(|e| ServiceError::ConstructionFailed {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })?;

        Ok(ServiceUnit::new(
            name,
            hooks,
            self.scheduler.clone(),
            UnitOptions {
                kind: unit_config.kind.clone(),
                interval_seconds: unit_config.interval_seconds,
                start_timeout: self.config.start_timeout(),
                stop_timeout: self.config.stop_timeout(),
                limiter,
            },
        ))
    }

    async fn apply_overrides(&self, unit: &ServiceUnit) {
        let Some(overrides) = self.overrides.get(unit.name()) else {
            return;
        };
        for (key, value) in overrides {
            match unit.apply_config(key, value).await {
                Ok(()) => info!("Applied stored override {}.{} = {}", unit.name(), key, value),
                Err(e) => warn!("Ignoring stored override {}.{}: {}", unit.name(), key, e),
            }
        }
    }
}
