use super::{Config, UnitConfigFile};
use crate::errors::ConfigError;
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Loads `main.toml` plus every other `*.toml` in the config directory as a
/// unit file.
pub struct ConfigManager {
    config_dir: String,
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            config_dir,
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path).await.map_err(|e| {
            ConfigError::LoadFailed {
                path: main_config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut config: Config = toml::from_str(&main_config_content).map_err(|e| {
            ConfigError::ParseError {
                reason: format!("{}: {}", main_config_path, e),
            }
        })?;

        let pattern = format!("{}/*.toml", config_dir);
        let mut all_units = HashMap::new();
        let mut unit_files = 0;

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename"))?;

            if filename == "main.toml" {
                continue;
            }

            debug!("Loading unit config: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;

            let unit_file: UnitConfigFile =
                toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    reason: format!("{}: {}", path.display(), e),
                })?;

            for (unit_name, unit_config) in unit_file.units {
                if all_units.contains_key(&unit_name) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("units.{}", unit_name),
                        reason: format!("defined more than once (again in {})", filename),
                    }
                    .into());
                }
                all_units.insert(unit_name, unit_config);
            }
            unit_files += 1;
        }

        config.units = all_units;
        config.validate()?;

        info!(
            "Loaded {} units from {} unit files, {} rate limiters",
            config.units.len(),
            unit_files,
            config.rate_limiters.len()
        );

        Ok(config)
    }
}
