use crate::address::Address;
use std::io;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with ledger storage
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO errors that occur when reading/writing files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Database errors that occur with the underlying storage backend
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors related to missing or invalid data
    #[error("Not found: {0}")]
    NotFound(String),

    /// Token metadata can only be written once per store
    #[error("Ledger already holds token metadata")]
    AlreadyInitialized,

    /// Generic errors that don't fit in other categories
    #[error("Other error: {0}")]
    Other(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        StorageError::Other(err)
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        StorageError::Other(err.to_string())
    }
}

/// Errors surfaced by token operations and deployment
#[derive(Error, Debug)]
pub enum TokenError {
    /// A holder tried to authorize itself as its own operator
    #[error("{holder} is implicitly its own operator and cannot authorize itself")]
    RejectedSelfAuthorization { holder: Address },

    /// The ledger has no token metadata yet
    #[error("Token has not been initialized")]
    NotInitialized,

    /// Deployment was attempted on a ledger that already carries a token
    #[error("Token has already been initialized")]
    AlreadyInitialized,

    #[error("Token name must not be empty")]
    EmptyName,

    #[error("Token symbol must not be empty")]
    EmptySymbol,

    #[error("Granularity must be at least 1, got {0}")]
    InvalidGranularity(i32),

    #[error("Invalid total supply: {0}")]
    InvalidTotalSupply(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;
