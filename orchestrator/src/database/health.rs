//! Health history database operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

use super::records::HealthRecord;
use super::{query_failed, serialization_failed, Database};

impl Database {
    pub async fn store_health_record(&self, record: &HealthRecord) -> Result<()> {
        let problems = serde_json::to_string(&record.problems).map_err(serialization_failed)?;
        let metrics = serde_json::to_string(&record.metrics).map_err(serialization_failed)?;
        let services = serde_json::to_string(&record.services).map_err(serialization_failed)?;

        sqlx::query(
            r#"
            INSERT INTO health_records (
                id, timestamp, total, active, error_count, problems, metrics, services
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.timestamp)
        .bind(record.total)
        .bind(record.active)
        .bind(record.error_count)
        .bind(problems)
        .bind(metrics)
        .bind(services)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("insert health_records", e))?;

        debug!("Stored health record {}", record.id);
        Ok(())
    }

    pub async fn get_latest_health_record(&self) -> Result<Option<HealthRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, timestamp, total, active, error_count, problems, metrics, services
            FROM health_records
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("select latest health_records", e))?;

        row.map(|row| health_record_from_row(&row)).transpose()
    }

    /// Newest first
    pub async fn get_health_history(&self, limit: i64) -> Result<Vec<HealthRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, total, active, error_count, problems, metrics, services
            FROM health_records
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("select health_records history", e))?;

        rows.iter().map(health_record_from_row).collect()
    }

    /// Delete records older than `cutoff`, returning how many went away
    pub async fn cleanup_health_records(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM health_records WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("delete health_records", e))?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!("Removed {} health records older than {}", removed, cutoff);
        }
        Ok(removed)
    }
}

fn health_record_from_row(row: &SqliteRow) -> Result<HealthRecord> {
    let problems: String = row.try_get("problems")?;
    let metrics: String = row.try_get("metrics")?;
    let services: String = row.try_get("services")?;

    Ok(HealthRecord {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        total: row.try_get("total")?,
        active: row.try_get("active")?,
        error_count: row.try_get("error_count")?,
        problems: serde_json::from_str(&problems).map_err(serialization_failed)?,
        metrics: serde_json::from_str(&metrics).map_err(serialization_failed)?,
        services: serde_json::from_str(&services).map_err(serialization_failed)?,
    })
}
