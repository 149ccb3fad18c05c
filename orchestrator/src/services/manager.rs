use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::unit::{ServiceUnit, UnitStatus};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesSummary {
    pub total: usize,
    pub active: usize,
    pub error_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConfigResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

/// Registry of units and the bulk operations over them
pub struct ServiceManager {
    services: RwLock<HashMap<String, Arc<ServiceUnit>>>,
    stop_timeout: Duration,
}

impl ServiceManager {
    pub fn new(services: HashMap<String, Arc<ServiceUnit>>, stop_timeout: Duration) -> Self {
        info!("Service manager initialized with {} units", services.len());
        Self {
            services: RwLock::new(services),
            stop_timeout,
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    async fn snapshot(&self) -> Vec<Arc<ServiceUnit>> {
        self.services.read().await.values().cloned().collect()
    }

    pub async fn get_service(&self, name: &str) -> Option<Arc<ServiceUnit>> {
        self.services.read().await.get(name).cloned()
    }

    /// Add a unit at runtime; it is not started
    pub async fn register_service(
        &self,
        name: &str,
        unit: Arc<ServiceUnit>,
    ) -> Result<(), ServiceError> {
        let mut services = self.services.write().await;
        if services.contains_key(name) {
            return Err(ServiceError::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        services.insert(name.to_string(), unit);
        info!("Registered unit {}", name);
        Ok(())
    }

    /// Stop and drop a unit
    #[instrument(skip(self))]
    pub async fn unregister_service(&self, name: &str) -> Result<(), ServiceError> {
        let unit = self
            .get_service(name)
            .await
            .ok_or_else(|| ServiceError::NotFound {
                name: name.to_string(),
            })?;

        unit.stop(self.stop_timeout).await;
        self.services.write().await.remove(name);
        info!("Unregistered unit {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn start_service(&self, name: &str) -> bool {
        match self.get_service(name).await {
            Some(unit) => unit.start().await,
            None => {
                warn!("Cannot start unknown unit {}", name);
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn stop_service(&self, name: &str) -> bool {
        match self.get_service(name).await {
            Some(unit) => unit.stop(self.stop_timeout).await,
            None => {
                warn!("Cannot stop unknown unit {}", name);
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn restart_service(&self, name: &str) -> bool {
        match self.get_service(name).await {
            Some(unit) => unit.restart().await,
            None => {
                warn!("Cannot restart unknown unit {}", name);
                false
            }
        }
    }

    /// Start every unit concurrently
    #[instrument(skip(self))]
    pub async fn start_services(&self) -> BTreeMap<String, bool> {
        let units = self.snapshot().await;
        let results = join_all(units.iter().map(|unit| async move {
            (unit.name().to_string(), unit.start().await)
        }))
        .await;

        let started = results.iter().filter(|(_, ok)| *ok).count();
        info!("Started {}/{} units", started, results.len());
        results.into_iter().collect()
    }

    /// Stop every unit concurrently, each within `timeout`
    #[instrument(skip(self))]
    pub async fn stop_services(&self, timeout: Duration) -> BTreeMap<String, bool> {
        let units = self.snapshot().await;
        let results = join_all(units.iter().map(|unit| async move {
            (unit.name().to_string(), unit.stop(timeout).await)
        }))
        .await;

        let clean = results.iter().filter(|(_, ok)| *ok).count();
        if clean < results.len() {
            warn!(
                "{} units did not stop within {}s and were forced down",
                results.len() - clean,
                timeout.as_secs_f64()
            );
        }
        info!("Stopped {} units", results.len());
        results.into_iter().collect()
    }

    /// Status of every unit; a unit whose report fails keeps its lifecycle
    /// fields and gets a `status_error` marker
    pub async fn get_all_services_status(&self) -> BTreeMap<String, UnitStatus> {
        self.snapshot()
            .await
            .iter()
            .map(|unit| (unit.name().to_string(), status_of(unit)))
            .collect()
    }

    pub async fn get_service_status(&self, name: &str) -> Option<UnitStatus> {
        let unit = self.get_service(name).await?;
        Some(status_of(&unit))
    }

    pub async fn get_summary(&self) -> ServicesSummary {
        summarize(self.get_all_services_status().await.values())
    }

    /// Apply configuration keys to one unit, reporting each key separately
    #[instrument(skip(self, values))]
    pub async fn apply_config(
        &self,
        name: &str,
        values: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, ConfigResult>, ServiceError> {
        let unit = self
            .get_service(name)
            .await
            .ok_or_else(|| ServiceError::NotFound {
                name: name.to_string(),
            })?;

        let mut results = BTreeMap::new();
        for (key, value) in values {
            let result = match unit.apply_config(key, value).await {
                Ok(()) => ConfigResult::ok(),
                Err(e) => {
                    warn!("Config key {} rejected for unit {}: {}", key, name, e);
                    ConfigResult::failed(e.to_string())
                }
            };
            results.insert(key.clone(), result);
        }
        Ok(results)
    }
}

pub fn summarize<'a>(statuses: impl Iterator<Item = &'a UnitStatus>) -> ServicesSummary {
    statuses.fold(ServicesSummary::default(), |mut summary, status| {
        summary.total += 1;
        if status.running {
            summary.active += 1;
        }
        summary.error_count += status.error_count;
        summary
    })
}

fn status_of(unit: &ServiceUnit) -> UnitStatus {
    unit.get_status().unwrap_or_else(|e| {
        warn!("Status report of unit {} failed: {:#}", unit.name(), e);
        unit.base_status().with_status_error(&format!("{:#}", e))
    })
}
