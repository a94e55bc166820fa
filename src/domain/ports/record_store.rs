use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Kinds of entity the engine stores durably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ServiceRequest,
    Classification,
    PriorityAssignment,
    DelegationPlan,
    EscalationTicket,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceRequest => "service_request",
            Self::Classification => "classification",
            Self::PriorityAssignment => "priority_assignment",
            Self::DelegationPlan => "delegation_plan",
            Self::EscalationTicket => "escalation_ticket",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same write may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Port for the durable document/record store.
///
/// The engine treats the store as eventually consistent: writes are issued
/// from a write-behind queue and in-memory state stays authoritative.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace an entity.
    async fn persist(&self, kind: EntityKind, id: Uuid, entity: &Value) -> Result<(), StoreError>;

    /// Fetch an entity by kind and id.
    async fn fetch(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StoreError>;

    /// Apply a JSON merge patch to a stored entity.
    async fn update(&self, kind: EntityKind, id: Uuid, patch: &Value) -> Result<(), StoreError>;
}

/// Apply an RFC 7396 JSON merge patch in place.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
