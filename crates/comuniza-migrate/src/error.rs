//! Store-level error types.

use thiserror::Error;

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A guarded key was already present at commit time.
    ///
    /// Raised when a concurrent writer recorded the same migration node
    /// between the check and the commit.
    #[error("conflict: {0} already recorded")]
    Conflict(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
