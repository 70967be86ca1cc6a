//! Error types for the storage layer.

use thiserror::Error;

use crate::types::TerminationStep;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found")]
    NotFound,

    /// A record already exists under the same key.
    #[error("record already exists")]
    AlreadyExists,

    /// The stored termination step differs from the one the caller read.
    #[error("termination step conflict: expected {expected:?}, found {found:?}")]
    StepConflict {
        /// The step the caller expected to advance from.
        expected: TerminationStep,
        /// The step currently stored.
        found: TerminationStep,
    },

    /// The requested step change is not a single forward step.
    #[error("invalid termination step transition: {from:?} -> {to:?}")]
    InvalidStepTransition {
        /// The current step.
        from: TerminationStep,
        /// The requested step.
        to: TerminationStep,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}
