use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{
    Metadata, PriorityClass, SeverityTier, SpecialistRole, SpecialistStatus,
};

/// Errors raised while handing an assignment to a specialist
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No specialist registered for role {0}")]
    NoHandler(SpecialistRole),

    #[error("Specialist unavailable: {0}")]
    Unavailable(String),
}

/// Everything a specialist needs to work an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentContext {
    pub request_id: Uuid,
    pub assignment_id: Uuid,
    pub role: SpecialistRole,
    pub required: bool,
    pub revision: u32,
    pub category: String,
    pub tier: SeverityTier,
    pub priority: PriorityClass,
    pub business_context: String,
    pub raw_text: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub lead_score: Option<f64>,
}

/// Asynchronous callback from a specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistReport {
    pub request_id: Uuid,
    pub role: SpecialistRole,
    pub status: SpecialistStatus,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Port through which the engine assigns work to specialists.
///
/// `assign` only hands the work over; completion arrives later through the
/// engine's `report` callback.
#[async_trait]
pub trait SpecialistDispatcher: Send + Sync {
    async fn assign(&self, context: AssignmentContext) -> Result<(), DispatchError>;
}
