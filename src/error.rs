//! # Error Types
//!
//! Structured error taxonomy for the workorder core using thiserror.
//! Transition failures (`Conflict`, `Forbidden`, `InvalidState`) surface
//! synchronously to the caller of `act` and are never retried automatically.
//! Delivery failures stay inside the dispatch queue and never propagate to
//! the ticket actor.

use thiserror::Error;

/// Errors surfaced by the state machine, matcher, and storage layers
#[derive(Error, Debug)]
pub enum FlowError {
    /// The optimistic concurrency token was stale: another transition
    /// already occurred. Callers must re-read the instance and retry.
    #[error("Stale transition token: expected step {expected}, instance is at {actual}")]
    Conflict { expected: String, actual: String },

    #[error("Operator {operator} may not {action}: {reason}")]
    Forbidden {
        operator: String,
        action: String,
        reason: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid process definition: {0}")]
    InvalidDefinition(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FlowError {
    /// Whether the caller should re-read state and resubmit
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;

/// Channel delivery failures, classified for the retry loop
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Retryable failure (network blip, provider timeout, rate limit)
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Non-retryable failure (bad address, unsupported channel)
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
