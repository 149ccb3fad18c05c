use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::unit::{Configurable, StatusReporter, UnitContext, UnitHooks};
use crate::errors::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatSettings {
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_message() -> String {
    "alive".to_string()
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            message: default_message(),
        }
    }
}

/// Logs a line on every tick; useful as a liveness signal for the scheduler
pub struct HeartbeatUnit {
    message: Mutex<String>,
    ticks: AtomicU64,
}

impl HeartbeatUnit {
    pub fn new(settings: HeartbeatSettings) -> Self {
        Self {
            message: Mutex::new(settings.message),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitHooks for HeartbeatUnit {
    async fn on_update(&self, ctx: &UnitContext) -> Result<()> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        info!("💓 {}: {} (tick {})", ctx.name, self.message.lock(), tick);
        Ok(())
    }

    fn as_status_reporter(&self) -> Option<&dyn StatusReporter> {
        Some(self)
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

impl StatusReporter for HeartbeatUnit {
    fn extra_status(&self) -> Result<Map<String, Value>> {
        let mut extra = Map::new();
        extra.insert("ticks".to_string(), Value::from(self.ticks()));
        extra.insert("message".to_string(), Value::from(self.message.lock().clone()));
        Ok(extra)
    }
}

impl Configurable for HeartbeatUnit {
    fn apply_setting(&self, key: &str, value: &Value) -> Result<(), ConfigError> {
        match key {
            "message" => {
                let message = value.as_str().ok_or_else(|| ConfigError::InvalidValue {
                    field: key.to_string(),
                    reason: "expected a string".to_string(),
                })?;
                *self.message.lock() = message.to_string();
                Ok(())
            }
            _ => Err(ConfigError::UnknownKey {
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_ticks_are_counted_and_reported() {
        let unit = HeartbeatUnit::new(HeartbeatSettings::default());
        let ctx = UnitContext {
            name: "beat".to_string(),
            token: CancellationToken::new(),
            limiter: None,
        };

        unit.on_update(&ctx).await.unwrap();
        unit.on_update(&ctx).await.unwrap();

        let extra = unit.extra_status().unwrap();
        assert_eq!(extra["ticks"], 2);
        assert_eq!(extra["message"], "alive");
    }

    #[test]
    fn test_message_is_configurable() {
        let unit = HeartbeatUnit::new(HeartbeatSettings::default());
        unit.apply_setting("message", &Value::from("still here")).unwrap();
        assert_eq!(unit.extra_status().unwrap()["message"], "still here");

        assert!(unit.apply_setting("message", &Value::from(3)).is_err());
        assert_eq!(
            unit.apply_setting("volume", &Value::from(3)),
            Err(ConfigError::UnknownKey {
                key: "volume".to_string()
            })
        );
    }
}
