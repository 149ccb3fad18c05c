use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::unit::{Configurable, StatusReporter, UnitContext, UnitHooks};
use crate::constants::http::DEFAULT_REQUEST_TIMEOUT;
use crate::errors::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpPollSettings {
    pub url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

#[derive(Debug, Default)]
struct PollState {
    last_status: Option<u16>,
    last_latency_ms: Option<u64>,
    polls: u64,
    skips: u64,
}

/// Polls a remote endpoint once per tick, throttled by the unit's limiter
pub struct HttpPollUnit {
    client: Client,
    settings: Mutex<HttpPollSettings>,
    state: Mutex<PollState>,
}

impl HttpPollUnit {
    pub fn new(client: Client, settings: HttpPollSettings) -> Result<Self> {
        validate_url(&settings.url).map_err(|e| anyhow!("{}", e))?;
        if settings.timeout_seconds == 0 {
            return Err(anyhow!("timeout_seconds must be at least 1"));
        }
        Ok(Self {
            client,
            settings: Mutex::new(settings),
            state: Mutex::new(PollState::default()),
        })
    }

    fn record(&self, status: Option<StatusCode>, latency: Duration) {
        let mut state = self.state.lock();
        state.polls += 1;
        state.last_status = status.map(|s| s.as_u16());
        state.last_latency_ms = Some(latency.as_millis() as u64);
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(ConfigError::InvalidValue {
            field: "url".to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            field: "url".to_string(),
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl UnitHooks for HttpPollUnit {
    async fn on_update(&self, ctx: &UnitContext) -> Result<()> {
        if let Some(limiter) = &ctx.limiter {
            if !limiter.can_execute() {
                self.state.lock().skips += 1;
                debug!(
                    "{}: rate limiter '{}' asks to wait {:.1}s, skipping tick",
                    ctx.name,
                    limiter.name(),
                    limiter.get_wait_time().as_secs_f64()
                );
                return Ok(());
            }
        }

        let (url, timeout) = {
            let settings = self.settings.lock();
            (settings.url.clone(), Duration::from_secs(settings.timeout_seconds))
        };

        let started = Instant::now();
        let response = tokio::select! {
            _ = ctx.token.cancelled() => return Ok(()),
            response = self.client.get(&url).timeout(timeout).send() => response,
        };

        match response {
            Ok(response) => {
                let status = response.status();
                self.record(Some(status), started.elapsed());

                if status.is_success() {
                    if let Some(limiter) = &ctx.limiter {
                        limiter.mark_success();
                    }
                    debug!("{}: {} answered {}", ctx.name, url, status);
                    Ok(())
                } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if let Some(limiter) = &ctx.limiter {
                        limiter.register_error(Some(&format!("HTTP {}", status)));
                    }
                    Err(anyhow!("{} answered {}", url, status))
                } else {
                    Err(anyhow!("{} answered {}", url, status))
                }
            }
            Err(e) => {
                self.record(None, started.elapsed());
                if let Some(limiter) = &ctx.limiter {
                    limiter.register_error(Some(&e.to_string()));
                }
                warn!("{}: request to {} failed: {}", ctx.name, url, e);
                Err(anyhow!("Request to {} failed: {}", url, e))
            }
        }
    }

    fn as_status_reporter(&self) -> Option<&dyn StatusReporter> {
        Some(self)
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

impl StatusReporter for HttpPollUnit {
    fn extra_status(&self) -> Result<Map<String, Value>> {
        let state = self.state.lock();
        let settings = self.settings.lock();
        let mut extra = Map::new();
        extra.insert("url".to_string(), Value::from(settings.url.clone()));
        extra.insert("last_status_code".to_string(), json!(state.last_status));
        extra.insert("last_latency_ms".to_string(), json!(state.last_latency_ms));
        extra.insert("polls".to_string(), Value::from(state.polls));
        extra.insert("skipped_ticks".to_string(), Value::from(state.skips));
        Ok(extra)
    }
}

impl Configurable for HttpPollUnit {
    fn apply_setting(&self, key: &str, value: &Value) -> Result<(), ConfigError> {
        match key {
            "url" => {
                let url = value.as_str().ok_or_else(|| ConfigError::InvalidValue {
                    field: key.to_string(),
                    reason: "expected a string".to_string(),
                })?;
                validate_url(url)?;
                self.settings.lock().url = url.to_string();
                Ok(())
            }
            "timeout_seconds" => match value.as_u64() {
                Some(seconds) if seconds > 0 => {
                    self.settings.lock().timeout_seconds = seconds;
                    Ok(())
                }
                _ => Err(ConfigError::InvalidValue {
                    field: key.to_string(),
                    reason: "expected a positive integer".to_string(),
                }),
            },
            _ => Err(ConfigError::UnknownKey {
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(url: &str) -> HttpPollUnit {
        HttpPollUnit::new(
            Client::new(),
            HttpPollSettings {
                url: url.to_string(),
                timeout_seconds: 5,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_urls() {
        let settings = HttpPollSettings {
            url: "ftp://example.com".to_string(),
            timeout_seconds: 5,
        };
        assert!(HttpPollUnit::new(Client::new(), settings).is_err());

        let settings = HttpPollSettings {
            url: "not a url".to_string(),
            timeout_seconds: 5,
        };
        assert!(HttpPollUnit::new(Client::new(), settings).is_err());
    }

    #[test]
    fn test_settings_updates() {
        let unit = unit("http://localhost:9/");
        unit.apply_setting("url", &Value::from("https://example.com/api"))
            .unwrap();
        unit.apply_setting("timeout_seconds", &Value::from(3)).unwrap();
        assert!(unit.apply_setting("timeout_seconds", &Value::from(0)).is_err());
        assert!(unit.apply_setting("url", &Value::from("gopher://x")).is_err());
        assert!(matches!(
            unit.apply_setting("retries", &Value::from(3)),
            Err(ConfigError::UnknownKey { .. })
        ));

        let extra = unit.extra_status().unwrap();
        assert_eq!(extra["url"], "https://example.com/api");
        assert_eq!(extra["polls"], 0);
        assert!(extra["last_status_code"].is_null());
    }

    #[test]
    fn test_unknown_settings_fields_are_rejected() {
        let parsed: Result<HttpPollSettings, _> =
            serde_json::from_value(serde_json::json!({"url": "http://x/", "retries": 2}));
        assert!(parsed.is_err());
    }
}
