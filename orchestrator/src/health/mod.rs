//! Health monitoring module
//!
//! Periodically polls the service manager, persists a status snapshot and a
//! health record per pass, and optionally restarts problem units.

pub mod metrics;
pub mod monitor;

pub use metrics::{MetricsCollector, ProcMetricsCollector, SystemMetrics};
pub use monitor::{write_status_snapshot, HealthMonitor, HealthReport};
