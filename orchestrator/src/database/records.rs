//! Database record types (entities).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One HealthMonitor poll as persisted in `health_records`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub total: i64,
    pub active: i64,
    pub error_count: i64,
    /// Names of units that were not running or not healthy
    pub problems: Vec<String>,
    pub metrics: Value,
    /// Per-unit status map as returned by the manager
    pub services: Value,
}

/// A configuration override applied through the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfigRecord {
    pub unit_name: String,
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}
