//! Service request domain model.
//!
//! A service request is the unit of work: it enters the pipeline on
//! ingestion and leaves it in exactly one terminal state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form metadata attached to an inbound request.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Lifecycle state of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Accepted at ingestion, not yet classified
    Received,
    /// Classification assigned
    Classified,
    /// Priority class and deadlines assigned
    Prioritized,
    /// Delegation plan created and dispatched
    Delegated,
    /// At least one specialist acknowledged or reported
    InProgress,
    /// An escalation ticket exists; human handling owns closure
    Escalated,
    /// Work finished, by a specialist or an operator
    Resolved,
    /// Closed without resolution (withdrawn, duplicate)
    Closed,
}

impl Default for RequestState {
    fn default() -> Self {
        Self::Received
    }
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Prioritized => "prioritized",
            Self::Delegated => "delegated",
            Self::InProgress => "in_progress",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> Vec<RequestState> {
        match self {
            Self::Received => vec![Self::Classified, Self::Closed],
            Self::Classified => vec![Self::Prioritized, Self::Closed],
            Self::Prioritized => vec![Self::Delegated, Self::Closed],
            Self::Delegated => vec![Self::InProgress, Self::Escalated, Self::Resolved, Self::Closed],
            Self::InProgress => vec![Self::Escalated, Self::Resolved, Self::Closed],
            Self::Escalated => vec![Self::Resolved, Self::Closed],
            Self::Resolved | Self::Closed => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound payload accepted by the ingestion interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestPayload {
    /// Caller-supplied identifier; generated when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Operating entity the request belongs to.
    pub business_context: String,
    /// Channel the request arrived on (webhook, email, cli, ...).
    #[serde(default)]
    pub channel: String,
    pub raw_text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl IngestPayload {
    pub fn new(business_context: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: None,
            business_context: business_context.into(),
            channel: "api".to_string(),
            raw_text: raw_text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Synchronous reply to an ingestion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub request_id: Uuid,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The unit of work tracked by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub business_context: String,
    pub channel: String,
    pub raw_text: String,
    pub metadata: Metadata,
    pub received_at: DateTime<Utc>,
    pub state: RequestState,
    /// Set when an invariant violation stopped processing of this request.
    #[serde(default)]
    pub halted: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServiceRequest {
    pub fn from_payload(payload: IngestPayload) -> Self {
        Self {
            id: payload.id.unwrap_or_else(Uuid::new_v4),
            business_context: payload.business_context,
            channel: payload.channel,
            raw_text: payload.raw_text,
            metadata: payload.metadata,
            received_at: Utc::now(),
            state: RequestState::Received,
            halted: false,
            updated_at: None,
        }
    }

    /// Contact identity taken from `metadata.contact`, if present.
    pub fn contact(&self) -> Option<&str> {
        self.metadata.get("contact").and_then(|v| v.as_str())
    }

    /// Apply a lifecycle transition, rejecting moves the state machine forbids.
    pub fn transition_to(&mut self, next: RequestState) -> crate::domain::DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(crate::domain::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: format!("request {}", self.id),
            });
        }
        self.state = next;
        self.updated_at = Some(Utc::now());
        Ok(())
    }
}
