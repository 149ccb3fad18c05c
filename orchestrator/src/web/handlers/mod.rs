//! HTTP request handlers for the control API.
//!
//! This module is organized by domain:
//! - `common` - Response envelope, error helpers and query structs
//! - `services` - Unit status, lifecycle control and runtime configuration
//! - `scheduler` - Job listing and pause/resume
//! - `rate_limiters` - Limiter status and reset
//! - `health` - Persisted health history

pub mod common;
pub mod health;
pub mod rate_limiters;
pub mod scheduler;
pub mod services;

pub use health::*;
pub use rate_limiters::*;
pub use scheduler::*;
pub use services::*;
