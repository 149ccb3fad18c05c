//! Test configuration builder writing a config directory to a temp dir

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for a `main.toml` plus one units file
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_lines: Vec<String>,
    unit_tables: Vec<String>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let database = temp_dir.path().join("data/orchestrator.db");
        let status = temp_dir.path().join("runtime/service_status.json");
        Self {
            main_lines: vec![
                format!("database_path = {:?}", database.display().to_string()),
                format!("status_file = {:?}", status.display().to_string()),
            ],
            temp_dir,
            unit_tables: Vec::new(),
        }
    }

    /// Raw `key = value` line for `main.toml`
    pub fn main_line(mut self, line: &str) -> Self {
        self.main_lines.push(line.to_string());
        self
    }

    pub fn rate_limiter(mut self, name: &str, initial_rate: f64, period_seconds: f64) -> Self {
        self.main_lines.push(format!(
            "\n[rate_limiters.{}]\ninitial_rate = {}\nperiod_seconds = {}",
            name, initial_rate, period_seconds
        ));
        self
    }

    pub fn heartbeat(mut self, name: &str, interval_seconds: u64) -> Self {
        self.unit_tables.push(format!(
            "[units.{}]\nkind = \"heartbeat\"\ninterval_seconds = {}\n",
            name, interval_seconds
        ));
        self
    }

    pub fn http_poll(mut self, name: &str, url: &str, rate_limiter: Option<&str>) -> Self {
        let limiter = rate_limiter
            .map(|l| format!("rate_limiter = {:?}\n", l))
            .unwrap_or_default();
        self.unit_tables.push(format!(
            "[units.{name}]\nkind = \"http_poll\"\ninterval_seconds = 60\n{limiter}\n[units.{name}.settings]\nurl = {url:?}\ntimeout_seconds = 2\n"
        ));
        self
    }

    /// Arbitrary unit table, written verbatim
    pub fn unit_table(mut self, toml: &str) -> Self {
        self.unit_tables.push(toml.to_string());
        self
    }

    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), self.main_lines.join("\n"))
            .expect("Failed to write main.toml");
        if !self.unit_tables.is_empty() {
            fs::write(config_dir.join("units.toml"), self.unit_tables.join("\n"))
                .expect("Failed to write units.toml");
        }

        TestConfig {
            config_dir,
            _temp_dir: self.temp_dir,
        }
    }
}

/// Written config directory; removed when dropped
pub struct TestConfig {
    config_dir: PathBuf,
    _temp_dir: TempDir,
}

impl TestConfig {
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_dir_string(&self) -> String {
        self.config_dir.display().to_string()
    }
}
