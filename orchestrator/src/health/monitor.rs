// File: orchestrator/src/health/monitor.rs
use crate::config::Config;
use crate::constants::health::ERROR_WARNING_THRESHOLD;
use crate::database::{Database, HealthRecord};
use crate::services::{ServiceManager, UnitStatus};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::metrics::{MetricsCollector, ProcMetricsCollector, SystemMetrics};

/// Outcome of one monitoring pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub active: usize,
    pub error_count: u64,
    pub problems: Vec<String>,
    pub metrics: SystemMetrics,
    /// Problem units for which a restart was attempted, with its outcome
    pub restarted: BTreeMap<String, bool>,
}

pub struct HealthMonitor {
    manager: Arc<ServiceManager>,
    database: Arc<Database>,
    collector: Arc<dyn MetricsCollector>,
    status_file: PathBuf,
    status_interval: Duration,
    auto_restart: bool,
    retention_hours: i64,
}

impl HealthMonitor {
    pub fn new(config: &Config, manager: Arc<ServiceManager>, database: Arc<Database>) -> Self {
        Self {
            manager,
            database,
            collector: Arc::new(ProcMetricsCollector::default()),
            status_file: PathBuf::from(&config.status_file),
            status_interval: Duration::from_secs(config.status_interval_seconds),
            auto_restart: config.auto_restart_services,
            retention_hours: config.health_retention_hours,
        }
    }

    pub fn with_collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.collector = collector;
        self
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    /// Run passes every `status_interval` until `token` is cancelled
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    pub async fn run(&self, token: CancellationToken) {
        info!(
            "Health monitor started (every {}s, auto-restart {})",
            self.status_interval.as_secs(),
            if self.auto_restart { "on" } else { "off" }
        );
        let mut ticker = tokio::time::interval(self.status_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        error!("Health check pass failed: {}", e);
                    }
                }
            }
        }
        info!("Health monitor stopped");
    }

    /// One pass: collect, persist, and optionally restart problem units
    pub async fn check_once(&self) -> Result<HealthReport> {
        let statuses = self.manager.get_all_services_status().await;
        let timestamp = Utc::now();

        let mut report = HealthReport {
            timestamp,
            total: statuses.len(),
            active: 0,
            error_count: 0,
            problems: Vec::new(),
            metrics: self.collect_metrics().await,
            restarted: BTreeMap::new(),
        };

        for (name, status) in &statuses {
            if status.running {
                report.active += 1;
            }
            report.error_count += status.error_count;
            if !status.running || !status.healthy {
                report.problems.push(name.clone());
            }
            if status.error_count > ERROR_WARNING_THRESHOLD {
                warn!(
                    "Unit {} has {} errors (last: {})",
                    name,
                    status.error_count,
                    status.last_error.as_deref().unwrap_or("none")
                );
            }
        }

        debug!(
            "Health pass: {}/{} active, {} problems",
            report.active,
            report.total,
            report.problems.len()
        );

        if let Err(e) = write_status_snapshot(&self.status_file, timestamp, &statuses).await {
            error!("Failed to write status snapshot: {}", e);
        }

        let record = HealthRecord {
            id: Uuid::new_v4().to_string(),
            timestamp,
            total: report.total as i64,
            active: report.active as i64,
            error_count: report.error_count as i64,
            problems: report.problems.clone(),
            metrics: serde_json::to_value(&report.metrics)?,
            services: serde_json::to_value(&statuses)?,
        };
        if let Err(e) = self.database.store_health_record(&record).await {
            error!("Failed to store health record: {}", e);
        }

        if self.auto_restart {
            for name in &report.problems {
                warn!("Auto-restarting problem unit {}", name);
                let restarted = self.manager.restart_service(name).await;
                if !restarted {
                    error!("✗ Auto-restart of unit {} failed", name);
                }
                report.restarted.insert(name.clone(), restarted);
            }
        }

        Ok(report)
    }

    async fn collect_metrics(&self) -> SystemMetrics {
        let collector = self.collector.clone();
        match tokio::task::spawn_blocking(move || collector.collect()).await {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                debug!("System metrics unavailable: {}", e);
                SystemMetrics::default()
            }
            Err(e) => {
                error!("Metrics collection task failed: {}", e);
                SystemMetrics::default()
            }
        }
    }

    /// Drop health history older than the retention window
    pub async fn cleanup_history(&self) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::hours(self.retention_hours);
        self.database.cleanup_health_records(cutoff).await
    }
}

/// Overwrite the snapshot file atomically: write a sibling temp file, then rename
pub async fn write_status_snapshot(
    path: &Path,
    timestamp: DateTime<Utc>,
    statuses: &BTreeMap<String, UnitStatus>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let snapshot = json!({
        "timestamp": timestamp,
        "services": statuses,
    });
    let body = serde_json::to_vec_pretty(&snapshot)?;

    let mut temp_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Status file path {} has no file name", path.display()))?
        .to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    tokio::fs::write(&temp_path, body).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}
