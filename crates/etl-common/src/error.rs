//! Error types for shared ETL types

use thiserror::Error;

/// Result type alias for shared-type operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors raised while parsing or validating shared types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EtlError {
    #[error("Unknown entity '{0}' (expected one of: products, prices, contracts)")]
    UnknownEntity(String),

    #[error("Invalid load status: {0}")]
    InvalidStatus(String),
}
