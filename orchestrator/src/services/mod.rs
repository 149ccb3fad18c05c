// File: orchestrator/src/services/mod.rs

pub mod factory;
pub mod heartbeat;
pub mod http_poll;
pub mod manager;
pub mod unit;

pub use factory::{BuildContext, ConfigOverrides, ServiceFactory};
pub use heartbeat::HeartbeatUnit;
pub use http_poll::HttpPollUnit;
pub use manager::{ConfigResult, ServiceManager, ServicesSummary};
pub use unit::{
    Configurable, ServiceUnit, StatusReporter, UnitContext, UnitHooks, UnitOptions, UnitState,
    UnitStatus,
};
