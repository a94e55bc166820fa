//! Escalation tickets and human-operator notification.
//!
//! Ticket creation is idempotent per request: a second trigger raises the
//! existing ticket's priority flag and is appended to its trigger history.
//! Notification runs in the background and never delays the ticket.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::event_bus::{EventBus, EventCategory, EventPayload, EventSeverity};
use super::persistence::PersistenceGate;
use super::retry::RetryPolicy;
use crate::domain::models::{
    EscalationSnapshot, EscalationState, EscalationTicket, PriorityClass, TriggerReason,
    TriggerRecord,
};
use crate::domain::ports::{ContextProvider, EntityKind, Notification, Notifier, NotifyError};
use crate::domain::{DomainError, DomainResult};

/// One escalation trigger.
#[derive(Debug, Clone)]
pub struct EscalationTrigger {
    pub request_id: Uuid,
    pub reason: TriggerReason,
    pub detail: String,
    pub priority: PriorityClass,
    pub snapshot: EscalationSnapshot,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EscalationOutcome {
    Created(EscalationTicket),
    Updated(EscalationTicket),
    /// The request's ticket is already resolved; nothing changed.
    AlreadyResolved(EscalationTicket),
}

impl EscalationOutcome {
    pub fn ticket(&self) -> &EscalationTicket {
        match self {
            Self::Created(t) | Self::Updated(t) | Self::AlreadyResolved(t) => t,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Default)]
struct TicketIndex {
    by_request: HashMap<Uuid, EscalationTicket>,
    request_for_ticket: HashMap<Uuid, Uuid>,
}

pub struct EscalationManager {
    tickets: RwLock<TicketIndex>,
    bus: Arc<EventBus>,
    persistence: PersistenceGate,
    notifier: Arc<dyn Notifier>,
    channel: String,
    retry: RetryPolicy,
    context: Arc<dyn ContextProvider>,
    notifications: Mutex<JoinSet<()>>,
}

impl EscalationManager {
    pub fn new(
        bus: Arc<EventBus>,
        persistence: PersistenceGate,
        notifier: Arc<dyn Notifier>,
        channel: impl Into<String>,
        retry: RetryPolicy,
        context: Arc<dyn ContextProvider>,
    ) -> Self {
        Self {
            tickets: RwLock::new(TicketIndex::default()),
            bus,
            persistence,
            notifier,
            channel: channel.into(),
            retry,
            context,
            notifications: Mutex::new(JoinSet::new()),
        }
    }

    /// Create the request's ticket, or update it if one exists.
    pub async fn escalate(&self, trigger: EscalationTrigger) -> EscalationOutcome {
        let request_id = trigger.request_id;
        let outcome = {
            let mut index = self.tickets.write().await;
            match index.by_request.get_mut(&request_id) {
                Some(ticket) if ticket.state == EscalationState::Resolved => {
                    EscalationOutcome::AlreadyResolved(ticket.clone())
                }
                Some(ticket) => {
                    let now = Utc::now();
                    ticket.priority_flag = ticket.priority_flag.max(trigger.priority).raised();
                    ticket.triggers.push(TriggerRecord {
                        reason: trigger.reason,
                        detail: trigger.detail.clone(),
                        at: now,
                    });
                    ticket.updated_at = now;
                    EscalationOutcome::Updated(ticket.clone())
                }
                None => {
                    let ticket = EscalationTicket::open(
                        request_id,
                        trigger.reason,
                        trigger.detail.clone(),
                        trigger.priority,
                        trigger.snapshot,
                    );
                    index.request_for_ticket.insert(ticket.id, request_id);
                    index.by_request.insert(request_id, ticket.clone());
                    EscalationOutcome::Created(ticket)
                }
            }
        };

        match &outcome {
            EscalationOutcome::Created(ticket) => {
                tracing::warn!(
                    %request_id,
                    ticket_id = %ticket.id,
                    reason = %ticket.reason,
                    priority = %ticket.priority_flag,
                    detail = %trigger.detail,
                    "Escalation ticket created"
                );
                self.persistence
                    .persist(EntityKind::EscalationTicket, ticket.id, ticket);
                self.bus
                    .emit(
                        EventSeverity::Warning,
                        EventCategory::Escalation,
                        Some(request_id),
                        EventPayload::TicketCreated {
                            request_id,
                            ticket_id: ticket.id,
                            reason: ticket.reason,
                            priority: ticket.priority_flag,
                        },
                    )
                    .await;
                if let Some(contact) = trigger.contact.as_deref() {
                    self.context.record_escalation(contact).await;
                }
                self.notify(ticket, &trigger.detail).await;
            }
            EscalationOutcome::Updated(ticket) => {
                tracing::warn!(
                    %request_id,
                    ticket_id = %ticket.id,
                    reason = %trigger.reason,
                    priority = %ticket.priority_flag,
                    "Escalation ticket updated by repeat trigger"
                );
                self.persistence.update(
                    EntityKind::EscalationTicket,
                    ticket.id,
                    json!({
                        "priority_flag": ticket.priority_flag,
                        "triggers": ticket.triggers,
                        "updated_at": ticket.updated_at,
                    }),
                );
                self.bus
                    .emit(
                        EventSeverity::Warning,
                        EventCategory::Escalation,
                        Some(request_id),
                        EventPayload::TicketUpdated {
                            request_id,
                            ticket_id: ticket.id,
                            reason: trigger.reason,
                            priority: ticket.priority_flag,
                        },
                    )
                    .await;
            }
            EscalationOutcome::AlreadyResolved(ticket) => {
                tracing::debug!(%request_id, ticket_id = %ticket.id, "Ticket already resolved, trigger ignored");
            }
        }

        outcome
    }

    /// An operator takes ownership of a ticket.
    pub async fn claim(&self, ticket_id: Uuid, operator: &str) -> DomainResult<EscalationTicket> {
        let ticket = self
            .modify(ticket_id, |ticket| {
                ticket.transition_to(EscalationState::HumanAssigned)?;
                ticket.operator = Some(operator.to_string());
                Ok(())
            })
            .await?;

        tracing::info!(%ticket_id, operator, "Escalation ticket claimed");
        self.persistence.update(
            EntityKind::EscalationTicket,
            ticket_id,
            json!({
                "state": ticket.state,
                "operator": ticket.operator,
                "updated_at": ticket.updated_at,
            }),
        );
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Escalation,
                Some(ticket.request_id),
                EventPayload::TicketClaimed {
                    request_id: ticket.request_id,
                    ticket_id,
                    operator: operator.to_string(),
                },
            )
            .await;
        Ok(ticket)
    }

    /// The operator marks the ticket resolved.
    pub async fn resolve(
        &self,
        ticket_id: Uuid,
        resolution: Option<String>,
    ) -> DomainResult<EscalationTicket> {
        let ticket = self
            .modify(ticket_id, |ticket| {
                ticket.transition_to(EscalationState::Resolved)?;
                ticket.resolution = resolution.clone();
                ticket.resolved_at = Some(ticket.updated_at);
                Ok(())
            })
            .await?;

        tracing::info!(%ticket_id, request_id = %ticket.request_id, "Escalation ticket resolved");
        self.persistence.update(
            EntityKind::EscalationTicket,
            ticket_id,
            json!({
                "state": ticket.state,
                "resolution": ticket.resolution,
                "resolved_at": ticket.resolved_at,
                "updated_at": ticket.updated_at,
            }),
        );
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Escalation,
                Some(ticket.request_id),
                EventPayload::TicketResolved {
                    request_id: ticket.request_id,
                    ticket_id,
                },
            )
            .await;
        Ok(ticket)
    }

    /// Drop a finished request's ticket from the index. Returns the ticket
    /// as it stood.
    pub async fn release(&self, request_id: Uuid) -> Option<EscalationTicket> {
        let mut index = self.tickets.write().await;
        let ticket = index.by_request.remove(&request_id)?;
        index.request_for_ticket.remove(&ticket.id);
        Some(ticket)
    }

    pub async fn tracked(&self) -> usize {
        self.tickets.read().await.by_request.len()
    }

    pub async fn ticket_for_request(&self, request_id: Uuid) -> Option<EscalationTicket> {
        self.tickets.read().await.by_request.get(&request_id).cloned()
    }

    pub async fn ticket(&self, ticket_id: Uuid) -> Option<EscalationTicket> {
        let index = self.tickets.read().await;
        index
            .request_for_ticket
            .get(&ticket_id)
            .and_then(|request_id| index.by_request.get(request_id))
            .cloned()
    }

    pub async fn open_tickets(&self) -> Vec<EscalationTicket> {
        let index = self.tickets.read().await;
        let mut open: Vec<_> = index
            .by_request
            .values()
            .filter(|t| t.state.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|t| (std::cmp::Reverse(t.priority_flag), t.created_at));
        open
    }

    /// Wait for every in-flight notification to finish or give up.
    pub async fn wait_for_notifications(&self) {
        let mut set = self.notifications.lock().await;
        while set.join_next().await.is_some() {}
    }

    async fn modify(
        &self,
        ticket_id: Uuid,
        change: impl FnOnce(&mut EscalationTicket) -> DomainResult<()>,
    ) -> DomainResult<EscalationTicket> {
        let mut index = self.tickets.write().await;
        let request_id = *index
            .request_for_ticket
            .get(&ticket_id)
            .ok_or(DomainError::TicketNotFound(ticket_id))?;
        let ticket = index
            .by_request
            .get_mut(&request_id)
            .ok_or(DomainError::TicketNotFound(ticket_id))?;
        let mut draft = ticket.clone();
        change(&mut draft)?;
        *ticket = draft.clone();
        Ok(draft)
    }

    async fn notify(&self, ticket: &EscalationTicket, detail: &str) {
        let notification = Notification {
            ticket_id: ticket.id,
            request_id: ticket.request_id,
            reason: ticket.reason,
            priority: ticket.priority_flag,
            summary: format!(
                "{} escalation ({}): {detail}",
                ticket.priority_flag, ticket.reason
            ),
            created_at: ticket.created_at,
        };
        let notifier = self.notifier.clone();
        let channel = self.channel.clone();
        let retry = self.retry.clone();
        let bus = self.bus.clone();

        let mut set = self.notifications.lock().await;
        // Reap finished deliveries so the set does not grow without bound.
        while set.try_join_next().is_some() {}
        set.spawn(async move {
            let result = retry
                .execute(
                    || notifier.notify(&channel, &notification),
                    |e| matches!(e, NotifyError::Unavailable(_)),
                )
                .await;
            match result {
                Ok(()) => {
                    tracing::debug!(ticket_id = %notification.ticket_id, "Operators notified");
                }
                Err(e) => {
                    tracing::warn!(
                        ticket_id = %notification.ticket_id,
                        attempts = e.attempts,
                        error = %e.last,
                        "Operator notification degraded"
                    );
                    bus.emit(
                        EventSeverity::Warning,
                        EventCategory::Health,
                        Some(notification.request_id),
                        EventPayload::NotificationDegraded {
                            ticket_id: notification.ticket_id,
                            attempts: e.attempts,
                            error: e.last.to_string(),
                        },
                    )
                    .await;
                }
            }
        });
    }
}
