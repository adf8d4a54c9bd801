//! Errors raised by the coordinator's collaborators.
//!
//! None of these reach an HTTP caller as a distinguishing message. Control
//! surfaces turn them into a safe response and a log line.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationLockError {
    /// The backing config or content store failed.
    #[error("Store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Stored value for {key} is not a valid timestamp: {value:?}")]
    InvalidTimestamp { key: String, value: String },

    #[error("Could not decode migration options: {0}")]
    OptionsDecode(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MigrationLockError {
    /// Wrap any collaborator error.
    pub fn store<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MigrationLockError::Store(Box::new(e))
    }
}

pub type MigrationLockResult<T> = Result<T, MigrationLockError>;
