//! Per-request SLA timers.
//!
//! Each clock is a parked tokio task that wakes at the initial-response and
//! escalation deadlines. The clock phase lives behind a mutex shared by the
//! task and [`SlaClockService::cancel`]; whichever side takes it first at the
//! escalation deadline decides the outcome, and a recorded breach is never
//! undone by a later cancel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::business_calendar::BusinessCalendar;
use super::event_bus::{EventBus, EventCategory, EventPayload, EventSeverity};
use crate::domain::models::{PriorityAssignment, PriorityClass};

/// Signals delivered to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    InitialResponseDue { request_id: Uuid },
    EscalationDue { request_id: Uuid },
}

impl ClockSignal {
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::InitialResponseDue { request_id } | Self::EscalationDue { request_id } => {
                *request_id
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockPhase {
    Running,
    Breached,
    Cancelled,
}

/// Result of cancelling a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Stopped before the escalation deadline.
    Cancelled,
    /// The escalation deadline had already fired; the breach stands.
    AlreadyBreached,
    /// No clock was running for this request.
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub request_id: Uuid,
    pub class: PriorityClass,
    pub started_at: DateTime<Utc>,
    pub initial_response_due: DateTime<Utc>,
    pub escalation_due: DateTime<Utc>,
    pub phase: ClockPhase,
}

struct ClockEntry {
    snapshot: ClockSnapshot,
    escalation_at: Instant,
    phase: Arc<Mutex<ClockPhase>>,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
struct Emitter {
    bus: Arc<EventBus>,
    signals: mpsc::Sender<ClockSignal>,
}

impl Emitter {
    async fn initial_due(&self, request_id: Uuid) {
        self.send(ClockSignal::InitialResponseDue { request_id }).await;
    }

    async fn breach(&self, request_id: Uuid) {
        tracing::warn!(%request_id, "Escalation deadline reached");
        self.bus
            .emit(
                EventSeverity::Warning,
                EventCategory::Sla,
                Some(request_id),
                EventPayload::EscalationDue { request_id },
            )
            .await;
        self.send(ClockSignal::EscalationDue { request_id }).await;
    }

    async fn send(&self, signal: ClockSignal) {
        if self.signals.send(signal).await.is_err() {
            tracing::debug!(?signal, "Clock signal receiver closed");
        }
    }
}

/// Owns every running SLA clock.
pub struct SlaClockService {
    calendar: BusinessCalendar,
    emitter: Emitter,
    clocks: Mutex<HashMap<Uuid, ClockEntry>>,
}

impl SlaClockService {
    pub fn new(
        calendar: BusinessCalendar,
        bus: Arc<EventBus>,
        signals: mpsc::Sender<ClockSignal>,
    ) -> Self {
        Self {
            calendar,
            emitter: Emitter { bus, signals },
            clocks: Mutex::new(HashMap::new()),
        }
    }

    /// Start the clock for a request. A request has at most one clock;
    /// starting it again returns the existing one unchanged.
    pub async fn start(&self, request_id: Uuid, priority: &PriorityAssignment) -> ClockSnapshot {
        let snapshot = {
            let mut clocks = self.lock_clocks();
            if let Some(existing) = clocks.get(&request_id) {
                return existing.snapshot.clone();
            }

            let started_at = Utc::now();
            let (initial_due, escalation_due) = self.deadlines(started_at, priority);
            let now = Instant::now();
            let initial_at = now + until(started_at, initial_due);
            let escalation_at = now + until(started_at, escalation_due);

            let snapshot = ClockSnapshot {
                request_id,
                class: priority.class,
                started_at,
                initial_response_due: initial_due,
                escalation_due,
                phase: ClockPhase::Running,
            };

            let phase = Arc::new(Mutex::new(ClockPhase::Running));
            let handle = tokio::spawn(run_clock(
                request_id,
                initial_at,
                escalation_at,
                phase.clone(),
                self.emitter.clone(),
            ));

            clocks.insert(
                request_id,
                ClockEntry {
                    snapshot: snapshot.clone(),
                    escalation_at,
                    phase,
                    handle,
                },
            );
            snapshot
        };

        tracing::debug!(
            %request_id,
            class = %snapshot.class,
            escalation_due = %snapshot.escalation_due,
            "SLA clock started"
        );
        self.emitter
            .bus
            .emit(
                EventSeverity::Info,
                EventCategory::Sla,
                Some(request_id),
                EventPayload::ClockStarted {
                    request_id,
                    class: snapshot.class,
                    initial_response_due: snapshot.initial_response_due,
                    escalation_due: snapshot.escalation_due,
                },
            )
            .await;
        snapshot
    }

    /// Cancel a request's clock and destroy it. Called exactly once, when the
    /// request reaches a terminal state or is about to.
    pub async fn cancel(&self, request_id: Uuid) -> CancelOutcome {
        let Some(entry) = self.lock_clocks().remove(&request_id) else {
            return CancelOutcome::NotRunning;
        };

        let fire_now = {
            let mut phase = entry.phase.lock().unwrap_or_else(|e| e.into_inner());
            match *phase {
                ClockPhase::Breached => return CancelOutcome::AlreadyBreached,
                ClockPhase::Cancelled => return CancelOutcome::NotRunning,
                ClockPhase::Running if Instant::now() >= entry.escalation_at => {
                    *phase = ClockPhase::Breached;
                    true
                }
                ClockPhase::Running => {
                    *phase = ClockPhase::Cancelled;
                    false
                }
            }
        };

        if fire_now {
            // The timer task may not have been polled yet; the breach is ours to report.
            entry.handle.abort();
            self.emitter.breach(request_id).await;
            return CancelOutcome::AlreadyBreached;
        }

        entry.handle.abort();
        tracing::debug!(%request_id, "SLA clock cancelled");
        CancelOutcome::Cancelled
    }

    pub fn snapshot(&self, request_id: Uuid) -> Option<ClockSnapshot> {
        let clocks = self.lock_clocks();
        clocks.get(&request_id).map(|entry| {
            let mut snapshot = entry.snapshot.clone();
            snapshot.phase = *entry.phase.lock().unwrap_or_else(|e| e.into_inner());
            snapshot
        })
    }

    pub fn active_count(&self) -> usize {
        self.lock_clocks().len()
    }

    fn deadlines(
        &self,
        started_at: DateTime<Utc>,
        priority: &PriorityAssignment,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let initial = ChronoDuration::minutes(priority.initial_response_mins as i64);
        let escalation = ChronoDuration::minutes(priority.escalation_mins as i64);
        if priority.business_hours_only {
            (
                self.calendar.deadline_after(started_at, initial),
                self.calendar.deadline_after(started_at, escalation),
            )
        } else {
            (started_at + initial, started_at + escalation)
        }
    }

    fn lock_clocks(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ClockEntry>> {
        self.clocks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SlaClockService {
    fn drop(&mut self) {
        for entry in self.lock_clocks().values() {
            entry.handle.abort();
        }
    }
}

fn until(from: DateTime<Utc>, to: DateTime<Utc>) -> std::time::Duration {
    (to - from).to_std().unwrap_or_default()
}

async fn run_clock(
    request_id: Uuid,
    initial_at: Instant,
    escalation_at: Instant,
    phase: Arc<Mutex<ClockPhase>>,
    emitter: Emitter,
) {
    tokio::time::sleep_until(initial_at).await;
    if current_phase(&phase) == ClockPhase::Running {
        emitter.initial_due(request_id).await;
    }

    tokio::time::sleep_until(escalation_at).await;
    let breached = {
        let mut guard = phase.lock().unwrap_or_else(|e| e.into_inner());
        if *guard == ClockPhase::Running {
            *guard = ClockPhase::Breached;
            true
        } else {
            false
        }
    };
    if breached {
        emitter.breach(request_id).await;
    }
}

fn current_phase(phase: &Mutex<ClockPhase>) -> ClockPhase {
    *phase.lock().unwrap_or_else(|e| e.into_inner())
}
