//! Health metrics derived from the lifecycle event log.
//!
//! The monitor is read-only: it folds the append-only log into point-in-time
//! aggregates and never touches request state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event_bus::{EventPayload, UnifiedEvent};
use super::event_store::{EventQuery, EventStore, EventStoreError};
use crate::domain::models::PriorityClass;

/// Breach rate at or above which health is `strained`.
pub const STRAINED_BREACH_RATE: f64 = 0.10;

/// Open tickets at or above which health is at least `strained`.
pub const STRAINED_OPEN_TICKETS: usize = 10;

/// Breach rate at or above which health is `critical`.
pub const CRITICAL_BREACH_RATE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Harmonious,
    Strained,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Harmonious => "harmonious",
            Self::Strained => "strained",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time aggregates over all requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonyMetrics {
    pub generated_at: DateTime<Utc>,
    pub window_secs: u64,
    /// Non-terminal requests per priority class.
    pub active_requests: BTreeMap<PriorityClass, usize>,
    /// Requests halted by an invariant violation.
    pub halted_requests: usize,
    /// Tickets in `ticketed` or `human-assigned`.
    pub active_tickets: usize,
    pub received_in_window: usize,
    pub resolved_in_window: usize,
    pub breached_in_window: usize,
    /// Breached / resolved within the window; zero when nothing resolved.
    pub breach_rate: f64,
    /// Resolved / received within the window; zero when nothing received.
    pub resolution_rate: f64,
    /// Mean time to resolution in seconds, per class, over the window.
    pub mean_time_to_resolution_secs: BTreeMap<PriorityClass, f64>,
    pub persistence_degraded: bool,
    pub health: HealthStatus,
}

impl HarmonyMetrics {
    pub fn active_total(&self) -> usize {
        self.active_requests.values().sum()
    }
}

#[derive(Default)]
struct RequestFacts {
    received_at: Option<DateTime<Utc>>,
    class: Option<PriorityClass>,
    resolved_at: Option<DateTime<Utc>>,
    closed: bool,
    halted: bool,
    breached: bool,
}

pub struct HarmonyMonitor {
    store: Arc<dyn EventStore>,
}

impl HarmonyMonitor {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub async fn get_metrics(&self, window: Duration) -> Result<HarmonyMetrics, EventStoreError> {
        let events = self.store.query(EventQuery::new().ascending()).await?;
        Ok(compute_metrics(&events, window, Utc::now()))
    }
}

/// Fold an ascending event log into metrics as of `now`.
pub fn compute_metrics(events: &[UnifiedEvent], window: Duration, now: DateTime<Utc>) -> HarmonyMetrics {
    let since = chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut requests: HashMap<Uuid, RequestFacts> = HashMap::new();
    let mut open_tickets: HashMap<Uuid, bool> = HashMap::new();
    let mut persistence_degraded = false;

    for event in events {
        match &event.payload {
            EventPayload::RequestReceived { request_id, .. } => {
                requests.entry(*request_id).or_default().received_at = Some(event.timestamp);
            }
            EventPayload::PriorityAssigned {
                request_id, class, ..
            } => {
                requests.entry(*request_id).or_default().class = Some(*class);
            }
            EventPayload::EscalationDue { request_id } => {
                requests.entry(*request_id).or_default().breached = true;
            }
            EventPayload::RequestResolved { request_id, .. } => {
                requests.entry(*request_id).or_default().resolved_at = Some(event.timestamp);
            }
            EventPayload::RequestClosed { request_id, .. } => {
                requests.entry(*request_id).or_default().closed = true;
            }
            EventPayload::RequestHalted { request_id, .. } => {
                requests.entry(*request_id).or_default().halted = true;
            }
            EventPayload::TicketCreated { ticket_id, .. } => {
                open_tickets.insert(*ticket_id, true);
            }
            EventPayload::TicketResolved { ticket_id, .. } => {
                open_tickets.insert(*ticket_id, false);
            }
            EventPayload::PersistenceDegraded { .. } => persistence_degraded = true,
            EventPayload::PersistenceRecovered => persistence_degraded = false,
            _ => {}
        }
    }

    let mut active_requests: BTreeMap<PriorityClass, usize> =
        PriorityClass::ALL.into_iter().map(|c| (c, 0)).collect();
    let mut ttr_totals: BTreeMap<PriorityClass, (f64, usize)> = BTreeMap::new();
    let mut halted_requests = 0;
    let mut received_in_window = 0;
    let mut resolved_in_window = 0;
    let mut breached_in_window = 0;

    for facts in requests.values() {
        if facts.received_at.is_some_and(|t| t >= since) {
            received_in_window += 1;
        }

        let terminal = facts.resolved_at.is_some() || facts.closed;
        if facts.halted && !terminal {
            halted_requests += 1;
        } else if !terminal {
            if let Some(class) = facts.class {
                *active_requests.entry(class).or_default() += 1;
            }
        }

        let Some(resolved_at) = facts.resolved_at.filter(|t| *t >= since) else {
            continue;
        };
        resolved_in_window += 1;
        if facts.breached {
            breached_in_window += 1;
        }
        if let (Some(class), Some(received_at)) = (facts.class, facts.received_at) {
            let secs = (resolved_at - received_at).num_milliseconds() as f64 / 1000.0;
            let entry = ttr_totals.entry(class).or_insert((0.0, 0));
            entry.0 += secs;
            entry.1 += 1;
        }
    }

    let active_tickets = open_tickets.values().filter(|open| **open).count();
    let breach_rate = ratio(breached_in_window, resolved_in_window);
    let resolution_rate = ratio(resolved_in_window, received_in_window);
    let health = if breach_rate >= CRITICAL_BREACH_RATE {
        HealthStatus::Critical
    } else if breach_rate >= STRAINED_BREACH_RATE
        || active_tickets >= STRAINED_OPEN_TICKETS
        || persistence_degraded
    {
        HealthStatus::Strained
    } else {
        HealthStatus::Harmonious
    };

    HarmonyMetrics {
        generated_at: now,
        window_secs: window.as_secs(),
        active_requests,
        halted_requests,
        active_tickets,
        received_in_window,
        resolved_in_window,
        breached_in_window,
        breach_rate,
        resolution_rate,
        mean_time_to_resolution_secs: ttr_totals
            .into_iter()
            .map(|(class, (total, count))| (class, total / count as f64))
            .collect(),
        persistence_degraded,
        health,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
