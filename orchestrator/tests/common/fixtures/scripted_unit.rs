//! Unit hooks whose start, stop and tick behavior is set by the test

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use orchestrator::services::{UnitContext, UnitHooks};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedUnit {
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub ticks: AtomicU32,
    fail_start: Option<String>,
    start_delay: Option<Duration>,
    stop_delay: Option<Duration>,
    fail_ticks: bool,
}

impl ScriptedUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// `on_start` fails with `reason`
    pub fn failing_start(mut self, reason: &str) -> Self {
        self.fail_start = Some(reason.to_string());
        self
    }

    pub fn slow_start(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// `on_stop` ignores cancellation and sleeps for `delay`
    pub fn slow_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    pub fn failing_ticks(mut self) -> Self {
        self.fail_ticks = true;
        self
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn tick_count(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitHooks for ScriptedUnit {
    async fn on_start(&self, _ctx: &UnitContext) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_start {
            Some(reason) => Err(anyhow!("{}", reason)),
            None => Ok(()),
        }
    }

    async fn on_stop(&self, _ctx: &UnitContext) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn on_update(&self, _ctx: &UnitContext) -> Result<()> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if self.fail_ticks {
            return Err(anyhow!("scripted tick failure"));
        }
        Ok(())
    }
}
