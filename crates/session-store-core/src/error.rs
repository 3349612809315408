use std::time::Duration;

use thiserror::Error;

/// Errors raised by a document store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors surfaced by the session store to its caller.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Missing configuration, or the store could not be reached / indexed at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The lock backoff budget ran out before the lock was obtained.
    #[error("Could not obtain a session lock for {session_id} after {waited:?}")]
    LockTimeout { session_id: String, waited: Duration },

    /// The atomic upsert performed by `write` failed.
    #[error("Failed to write session {session_id}: {source}")]
    Write {
        session_id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Whether this error came from lock acquisition.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, SessionError::LockTimeout { .. })
    }
}
