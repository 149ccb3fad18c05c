pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod health;
pub mod rate_limiter;
pub mod scheduler;
pub mod services;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigManager, UnitConfig};
pub use database::Database;
pub use errors::OrchestratorError;
pub use health::HealthMonitor;
pub use rate_limiter::{AdaptiveRateLimiter, LimiterRegistry};
pub use scheduler::Scheduler;
pub use services::{ServiceFactory, ServiceManager, ServiceUnit};
