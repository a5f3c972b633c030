// Central Error Type for the Application

use std::time::Duration;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Connection or liveness check failed on every attempt
    #[error("Broker unavailable at {endpoint} after {attempts} attempt(s): {reason}")]
    BrokerUnavailable {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    /// The producer's result budget ran out before every job reported back
    #[error("Timed out after {budget:?} waiting for results: received {received} of {expected}")]
    ResultsTimeout {
        expected: u64,
        received: u64,
        budget: Duration,
    },

    #[error("Broker error: {0}")]
    Broker(#[from] crate::port::BrokerError),

    #[error("Protocol violation on '{queue}': {reason}")]
    Protocol { queue: String, reason: String },

    #[error("Kernel error: {0}")]
    Kernel(#[from] crate::port::KernelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The broker handle is unusable and has to be reopened
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, AppError::Broker(crate::port::BrokerError::Connection(_)))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
