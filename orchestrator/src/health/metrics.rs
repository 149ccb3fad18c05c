//! Host metrics attached to every health record
//!
//! Collection reads `/proc` synchronously, so callers run it on the blocking
//! pool.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub load_average_1m: Option<f64>,
    pub load_average_5m: Option<f64>,
    pub memory_total_kb: Option<u64>,
    pub memory_available_kb: Option<u64>,
    pub uptime_seconds: Option<f64>,
}

impl SystemMetrics {
    pub fn memory_used_percent(&self) -> Option<f64> {
        match (self.memory_total_kb, self.memory_available_kb) {
            (Some(total), Some(available)) if total > 0 => {
                Some((total.saturating_sub(available)) as f64 * 100.0 / total as f64)
            }
            _ => None,
        }
    }
}

/// Blocking source of [`SystemMetrics`]
pub trait MetricsCollector: Send + Sync {
    fn collect(&self) -> Result<SystemMetrics>;
}

/// Reads load, memory and uptime from a procfs mount
pub struct ProcMetricsCollector {
    proc_root: PathBuf,
}

impl Default for ProcMetricsCollector {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcMetricsCollector {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.proc_root.join(name);
        fs::read_to_string(&path).map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))
    }
}

impl MetricsCollector for ProcMetricsCollector {
    fn collect(&self) -> Result<SystemMetrics> {
        let mut metrics = SystemMetrics::default();

        let loadavg = self.read("loadavg")?;
        let mut loads = loadavg.split_whitespace().map(|v| v.parse::<f64>().ok());
        metrics.load_average_1m = loads.next().flatten();
        metrics.load_average_5m = loads.next().flatten();

        // Memory and uptime are best effort
        if let Ok(meminfo) = self.read("meminfo") {
            metrics.memory_total_kb = meminfo_value(&meminfo, "MemTotal");
            metrics.memory_available_kb = meminfo_value(&meminfo, "MemAvailable");
        }
        if let Ok(uptime) = self.read("uptime") {
            metrics.uptime_seconds = uptime
                .split_whitespace()
                .next()
                .and_then(|v| v.parse().ok());
        }

        Ok(metrics)
    }
}

fn meminfo_value(meminfo: &str, key: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}
