//! Domain errors for the Harmony request engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while processing service requests.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Service request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Escalation ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Invariant violated for request {request_id}: {detail}")]
    InvariantViolation { request_id: Uuid, detail: String },

    #[error("Request {0} is halted")]
    RequestHalted(Uuid),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::PersistenceError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
