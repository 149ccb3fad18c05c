// File: orchestrator/src/web/mod.rs
pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::rate_limiter::LimiterRegistry;
use crate::scheduler::Scheduler;
use crate::services::ServiceManager;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<ServiceManager>,
    pub scheduler: Scheduler,
    pub limiters: Arc<LimiterRegistry>,
    pub database: Arc<Database>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        manager: Arc<ServiceManager>,
        scheduler: Scheduler,
        limiters: Arc<LimiterRegistry>,
        database: Arc<Database>,
    ) -> Self {
        Self {
            config,
            manager,
            scheduler,
            limiters,
            database,
        }
    }
}
