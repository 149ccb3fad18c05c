//! Custom error types for the orchestrator
//!
//! Unit hook failures never surface as errors: they become log events and
//! status fields. The types here cover programmer and configuration errors
//! that are returned to the direct caller.

use std::fmt;

/// Main error type for the orchestrator
#[derive(Debug)]
pub enum OrchestratorError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Scheduler registration errors
    Scheduler(SchedulerError),

    /// Service registry errors
    Service(ServiceError),

    /// Database operation errors
    Database(DatabaseError),

    /// Other errors with context
    Other(String),
}

/// Configuration error variants
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Key not understood by the target
    UnknownKey { key: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

/// Scheduler error variants
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// A job with this id is already registered
    DuplicateJobId { job_id: String },

    /// Trigger cannot produce any firing
    InvalidTrigger { job_id: String, reason: String },
}

/// Service registry error variants
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// No unit registered under this name
    NotFound { name: String },

    /// A unit with this name is already registered
    AlreadyRegistered { name: String },

    /// Unit could not be constructed
    ConstructionFailed { name: String, reason: String },
}

/// Database error variants
#[derive(Debug)]
pub enum DatabaseError {
    /// Connection failed
    ConnectionFailed { reason: String },

    /// Query execution failed
    QueryFailed { query: String, reason: String },

    /// Data serialization/deserialization error
    SerializationError { reason: String },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Config(e) => write!(f, "Configuration error: {}", e),
            OrchestratorError::Scheduler(e) => write!(f, "Scheduler error: {}", e),
            OrchestratorError::Service(e) => write!(f, "Service error: {}", e),
            OrchestratorError::Database(e) => write!(f, "Database error: {}", e),
            OrchestratorError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::UnknownKey { key } => {
                write!(f, "Unknown configuration key: {}", key)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::DuplicateJobId { job_id } => {
                write!(f, "Job '{}' is already scheduled", job_id)
            }
            SchedulerError::InvalidTrigger { job_id, reason } => {
                write!(f, "Invalid trigger for job '{}': {}", job_id, reason)
            }
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::NotFound { name } => write!(f, "Service '{}' not found", name),
            ServiceError::AlreadyRegistered { name } => {
                write!(f, "Service '{}' is already registered", name)
            }
            ServiceError::ConstructionFailed { name, reason } => {
                write!(f, "Failed to construct service '{}': {}", name, reason)
            }
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::ConnectionFailed { reason } => {
                write!(f, "Database connection failed: {}", reason)
            }
            DatabaseError::QueryFailed { query, reason } => {
                write!(f, "Query '{}' failed: {}", query, reason)
            }
            DatabaseError::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for SchedulerError {}
impl std::error::Error for ServiceError {}
impl std::error::Error for DatabaseError {}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Other(err.to_string())
    }
}

impl From<ConfigError> for OrchestratorError {
    fn from(err: ConfigError) -> Self {
        OrchestratorError::Config(err)
    }
}

impl From<SchedulerError> for OrchestratorError {
    fn from(err: SchedulerError) -> Self {
        OrchestratorError::Scheduler(err)
    }
}

impl From<ServiceError> for OrchestratorError {
    fn from(err: ServiceError) -> Self {
        OrchestratorError::Service(err)
    }
}

impl From<DatabaseError> for OrchestratorError {
    fn from(err: DatabaseError) -> Self {
        OrchestratorError::Database(err)
    }
}

