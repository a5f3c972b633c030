// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid run shape: {0}")]
    InvalidRunShape(String),

    #[error("Invalid model parameter: {0}")]
    InvalidModelParameter(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
