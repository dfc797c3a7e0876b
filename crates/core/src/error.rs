//! Centralized error types for the Keel workspace.

use thiserror::Error;

/// Top-level error enum. Change attempts never return it; their failures
/// live in [`Outcome`](crate::Outcome).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeelError {
    #[error("Invalid outcome: {0}")]
    InvalidOutcome(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type KeelResult<T> = Result<T, KeelError>;
