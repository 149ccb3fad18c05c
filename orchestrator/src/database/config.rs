//! Unit configuration override operations.
//!
//! Keys accepted through the control plane are stored here and re-applied
//! when the factory builds units on the next start.

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use std::collections::HashMap;

use super::records::UnitConfigRecord;
use super::{query_failed, serialization_failed, Database};

impl Database {
    pub async fn save_unit_config(&self, unit_name: &str, key: &str, value: &Value) -> Result<()> {
        let value = serde_json::to_string(value).map_err(serialization_failed)?;

        sqlx::query(
            r#"
            INSERT INTO unit_config (unit_name, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(unit_name, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(unit_name)
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("upsert unit_config", e))?;

        Ok(())
    }

    pub async fn get_unit_config(&self, unit_name: &str) -> Result<Vec<UnitConfigRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT unit_name, key, value, updated_at
            FROM unit_config
            WHERE unit_name = ?
            ORDER BY key
            "#,
        )
        .bind(unit_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("select unit_config", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let value: String = row.try_get("value")?;
            records.push(UnitConfigRecord {
                unit_name: row.try_get("unit_name")?,
                key: row.try_get("key")?,
                value: serde_json::from_str(&value).map_err(serialization_failed)?,
                updated_at: row.try_get("updated_at")?,
            });
        }
        Ok(records)
    }

    /// Every stored override grouped by unit
    pub async fn get_all_unit_configs(&self) -> Result<HashMap<String, HashMap<String, Value>>> {
        let rows = sqlx::query("SELECT unit_name, key, value FROM unit_config")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("select all unit_config", e))?;

        let mut overrides: HashMap<String, HashMap<String, Value>> = HashMap::new();
        for row in rows {
            let unit_name: String = row.try_get("unit_name")?;
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            overrides.entry(unit_name).or_default().insert(
                key,
                serde_json::from_str(&value).map_err(serialization_failed)?,
            );
        }
        Ok(overrides)
    }
}
