//! This module provides reusable test utilities:
//! - Mock upstream API server for polling units
//! - Test configuration directories
//! - Scripted unit hooks with controllable start/stop behavior
//! - Wired-up orchestrator stacks on an in-memory database

// Not every test binary uses every fixture
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_api;
pub mod scripted_unit;
pub mod test_config;
pub mod test_stack;

pub use mock_api::MockApiServer;
pub use scripted_unit::ScriptedUnit;
pub use test_config::{TestConfig, TestConfigBuilder};
pub use test_stack::TestStack;
