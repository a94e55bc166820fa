//! End-to-end request scenarios: hard trigger, on-time resolution, SLA
//! breach and successful replanning.

mod common;

use std::time::Duration;

use common::{test_config, Harness, ManualDispatcher};
use harmony::domain::models::{
    PriorityClass, RequestState, SeverityTier, SpecialistRole, SpecialistStatus, TriggerReason,
};
use harmony::services::{EventPayload, EventQuery, EventStore};

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

/// Wait until the unacknowledged initial-response signal is logged.
async fn wait_for_initial_response(h: &Harness, request_id: uuid::Uuid) -> bool {
    for _ in 0..500 {
        let events = h
            .events
            .query(EventQuery::new().request_id(request_id))
            .await
            .unwrap();
        if events.iter().any(|e| {
            matches!(
                e.payload,
                EventPayload::InitialResponseDue { acknowledged: false, .. }
            )
        }) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn scenario_a_legal_action_goes_straight_to_a_human() {
    let h = Harness::start();
    let view = h
        .submit("The invoice is wrong again and we are considering legal action")
        .await;

    let classification = view.classification.clone().unwrap();
    assert_eq!(classification.tier, SeverityTier::Tier4);
    assert_eq!(classification.category, "billing");
    assert!(classification.hard_trigger.is_some());

    let plan = view.plan.clone().unwrap();
    assert!(plan.assignments.is_empty());
    assert!(plan.immediate_escalation);
    assert!(h.dispatcher.assigned().await.is_empty());

    let ticket = view.ticket.clone().expect("ticket created");
    assert_eq!(ticket.reason, TriggerReason::HardTrigger);
    assert_eq!(ticket.priority_flag, PriorityClass::Urgent);
    assert_eq!(view.request.state, RequestState::Escalated);

    h.engine.shutdown().await;
    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.ticket_id, ticket.id);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_medium_request_completed_in_time_resolves_without_ticket() {
    let h = Harness::start();
    let view = h.submit("I was charged twice on my invoice").await;
    let id = view.request.id;

    assert_eq!(view.classification.as_ref().unwrap().tier, SeverityTier::Tier2);
    assert_eq!(view.priority.as_ref().unwrap().class, PriorityClass::Medium);
    assert!(view.plan.as_ref().unwrap().assignments.len() >= 3);

    tokio::time::advance(minutes(90)).await;
    h.report_all_open(id, SpecialistStatus::Completed).await;

    let view = h.wait_for_state(id, RequestState::Resolved).await;
    assert!(view.ticket.is_none());
    assert!(!view.breached);
    assert!(view.clock.is_none());

    // The clock was cancelled: passing both deadlines changes nothing.
    tokio::time::advance(minutes(300)).await;
    tokio::task::yield_now().await;
    let view = h.view(id).await;
    assert!(view.ticket.is_none());
    assert!(!view.breached);
    assert!(h.engine.open_tickets().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn scenario_c_silent_low_priority_request_breaches_once() {
    let h = Harness::start();
    let view = h.submit("Can I book an appointment for next week?").await;
    let id = view.request.id;

    assert_eq!(view.classification.as_ref().unwrap().tier, SeverityTier::Tier1);
    assert_eq!(view.priority.as_ref().unwrap().class, PriorityClass::Low);

    tokio::time::advance(minutes(241)).await;
    assert!(wait_for_initial_response(&h, id).await);
    assert!(h.view(id).await.ticket.is_none());

    tokio::time::advance(minutes(240)).await;
    let view = h.wait_until(id, |v| v.ticket.is_some()).await;

    let ticket = view.ticket.expect("breach opens a ticket");
    assert_eq!(ticket.reason, TriggerReason::Breach);
    assert_eq!(ticket.triggers.len(), 1);
    assert!(view.breached);
    assert_eq!(view.request.state, RequestState::Escalated);
    assert_eq!(h.engine.open_tickets().await.len(), 1);

    let events = h.events.query(EventQuery::new().request_id(id).ascending()).await.unwrap();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::TicketCreated { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn scenario_d_two_failures_replan_once_and_resolve() {
    let mut config = test_config();
    config.engine.replan_coalesce_ms = 200;
    let h = Harness::with(config, ManualDispatcher::default());

    let view = h.submit("The site is down for all users").await;
    let id = view.request.id;
    assert_eq!(view.classification.as_ref().unwrap().tier, SeverityTier::Tier3);
    assert_eq!(view.plan.as_ref().unwrap().assignments.len(), 5);

    h.report_all_open(id, SpecialistStatus::Acknowledged).await;
    h.report(id, SpecialistRole::TechnicalSupport, SpecialistStatus::Failed).await;
    h.report(id, SpecialistRole::ContentWriter, SpecialistStatus::Failed).await;
    for role in [
        SpecialistRole::KnowledgeLookup,
        SpecialistRole::CustomerSuccess,
        SpecialistRole::QualityReview,
    ] {
        h.report(id, role, SpecialistStatus::Completed).await;
    }

    let view = h
        .wait_until(id, |v| v.plan.as_ref().is_some_and(|p| p.revision == 1))
        .await;
    let plan = view.plan.unwrap();
    assert_eq!(plan.revision, 1);
    let replacements: Vec<_> = plan.assignments.iter().filter(|a| a.revision == 1).collect();
    assert_eq!(replacements.len(), 2);
    assert!(replacements
        .iter()
        .all(|a| a.role != SpecialistRole::TechnicalSupport && a.role != SpecialistRole::ContentWriter));
    assert_ne!(view.request.state, RequestState::Resolved);

    h.report_all_open(id, SpecialistStatus::Completed).await;
    let view = h.wait_for_state(id, RequestState::Resolved).await;
    assert!(view.ticket.is_none());
    assert_eq!(view.plan.unwrap().revision, 1);

    let events = h.events.query(EventQuery::new().request_id(id)).await.unwrap();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::Replanned { .. }))
            .count(),
        1
    );
}
