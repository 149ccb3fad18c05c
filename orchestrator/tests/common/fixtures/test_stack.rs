//! Orchestrator components wired together on an in-memory database

use orchestrator::config::Config;
use orchestrator::rate_limiter::{AdaptiveRateLimiter, LimiterRegistry};
use orchestrator::services::{ServiceManager, ServiceUnit, UnitHooks, UnitOptions};
use orchestrator::web::{create_router, AppState};
use orchestrator::{Database, Scheduler};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct TestStack {
    pub config: Arc<Config>,
    pub scheduler: Scheduler,
    pub limiters: Arc<LimiterRegistry>,
    pub database: Arc<Database>,
    pub manager: Arc<ServiceManager>,
}

impl TestStack {
    /// Stack managing `units`, each ticking every `interval_seconds`
    pub async fn with_units(
        units: Vec<(&str, Arc<dyn UnitHooks>)>,
        interval_seconds: u64,
        stop_timeout: Duration,
    ) -> Self {
        let scheduler = Scheduler::default();
        let limiters = Arc::new(LimiterRegistry::new());
        limiters.insert(Arc::new(AdaptiveRateLimiter::with_defaults("remote-api")));

        let mut services = HashMap::new();
        for (name, hooks) in units {
            services.insert(
                name.to_string(),
                ServiceUnit::new(
                    name,
                    hooks,
                    scheduler.clone(),
                    UnitOptions {
                        interval_seconds,
                        stop_timeout,
                        ..UnitOptions::default()
                    },
                ),
            );
        }

        Self {
            config: Arc::new(Config::default()),
            scheduler,
            limiters,
            database: Arc::new(Database::in_memory().await.expect("in-memory database")),
            manager: Arc::new(ServiceManager::new(services, stop_timeout)),
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.config.clone(),
            self.manager.clone(),
            self.scheduler.clone(),
            self.limiters.clone(),
            self.database.clone(),
        )
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.app_state())
    }
}
