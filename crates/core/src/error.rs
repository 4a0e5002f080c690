//! Directory error model.

use std::io;

use thiserror::Error;

/// Result type used across the directory layer.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Directory-level error.
///
/// Every store operation reports one of these to its immediate caller. The
/// only condition that is not an error is a delete that matched nothing.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The operation targets a username absent from the store.
    #[error("user not found: {0}")]
    NotFound(String),

    /// A strict insert or a rename collided with an existing record.
    #[error("user already exists: {0}")]
    AlreadyExists(String),

    /// The request itself is malformed (bad username, delimiter in a field, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backing user file could not be read.
    #[error("failed to read user file")]
    StoreReadFailure {
        #[source]
        source: io::Error,
    },

    /// The backing user file could not be written.
    #[error("failed to write user file while {operation}")]
    StoreWriteFailure {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// The old line was removed but the new one was never written.
    ///
    /// The record is gone from the backing file. Callers must treat the
    /// current authentication attempt as failed and require re-registration.
    #[error("user {username} was removed but not written back; re-registration required")]
    PartialWriteFailure {
        username: String,
        #[source]
        source: io::Error,
    },

    /// A local credential placeholder could not be produced.
    #[error("credential generation failed: {0}")]
    Credential(String),
}

impl DirectoryError {
    pub fn not_found(username: impl Into<String>) -> Self {
        Self::NotFound(username.into())
    }

    pub fn already_exists(username: impl Into<String>) -> Self {
        Self::AlreadyExists(username.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn write_failure(operation: &'static str, source: io::Error) -> Self {
        Self::StoreWriteFailure { operation, source }
    }

    pub fn read_failure(source: io::Error) -> Self {
        Self::StoreReadFailure { source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the backing file lost a record that the caller still believes exists.
    pub fn is_data_loss(&self) -> bool {
        matches!(self, Self::PartialWriteFailure { .. })
    }
}
