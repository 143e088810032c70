//! Error types for the promotion engine.
//!
//! Store errors carry string payloads rather than the underlying driver
//! errors so they stay `Clone + PartialEq` and can cross task boundaries
//! in reports.

use thiserror::Error;

/// Failures raised by a [`DelayStore`](crate::store::DelayStore) provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Pool or connection establishment failed
    #[error("Store connection error: {0}")]
    Connection(String),

    /// A store command failed at the protocol or server level
    #[error("Store operation {operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    /// The per-operation deadline elapsed before the store replied
    #[error("Store operation {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl StoreError {
    /// Command-failure constructor used throughout the providers.
    pub fn operation(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Operation {
            operation,
            message: err.to_string(),
        }
    }
}

/// Failures raised by the promotion pipeline on top of the store layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromotionError {
    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The move transaction committed but one of its operations reported
    /// zero effect, so the group cannot be considered promoted
    #[error("Partial commit for topic {topic}: removed {removed}, queued {queued}")]
    PartialCommit {
        topic: String,
        removed: i64,
        queued: i64,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type PromotionResult<T> = std::result::Result<T, PromotionError>;
