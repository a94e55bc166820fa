//! The request engine.
//!
//! Wires the classifier, priority resolver, delegation planner, SLA clocks,
//! escalation manager and harmony monitor into one pipeline. Every request
//! is processed by its own task; state for one request sits behind its own
//! mutex, so requests never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::business_calendar::BusinessCalendar;
use super::capacity::CapacityRegistry;
use super::classifier::Classifier;
use super::delegation_planner::{DelegationPlanner, ReplanError};
use super::escalation_manager::{EscalationManager, EscalationOutcome, EscalationTrigger};
use super::event_bus::{
    EventBus, EventBusConfig, EventCategory, EventPayload, EventSeverity, ResolvedBy,
};
use super::event_store::{EventStore, EventStoreError};
use super::harmony_monitor::{HarmonyMetrics, HarmonyMonitor};
use super::persistence::PersistenceGate;
use super::priority_resolver::PriorityResolver;
use super::retry::RetryPolicy;
use super::sla_clock::{CancelOutcome, ClockSignal, ClockSnapshot, SlaClockService};
use crate::domain::models::{
    Assignment, AssignmentStatus, Classification, Config, DelegationPlan, EscalationSnapshot,
    EscalationTicket, IngestPayload, IngestResponse, PriorityAssignment, PriorityClass,
    RequestState, RuleBook, RuleBookError, ServiceRequest, SpecialistStatus, TriggerReason,
};
use crate::domain::ports::{
    AssignmentContext, ContextProvider, EntityKind, Notifier, RecordStore, SpecialistDispatcher,
    SpecialistReport,
};
use crate::domain::{DomainError, DomainResult};

/// Sending half of the specialist callback channel.
#[derive(Clone)]
pub struct Reporter {
    tx: mpsc::Sender<SpecialistReport>,
}

impl Reporter {
    pub async fn report(&self, report: SpecialistReport) -> bool {
        self.tx.send(report).await.is_ok()
    }
}

/// Receiving half of the specialist callback channel, consumed by the engine.
pub struct ReportInbox {
    rx: mpsc::Receiver<SpecialistReport>,
}

impl ReportInbox {
    pub async fn recv(&mut self) -> Option<SpecialistReport> {
        self.rx.recv().await
    }
}

/// Create a callback channel for specialists that report asynchronously.
pub fn report_channel(capacity: usize) -> (Reporter, ReportInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Reporter { tx }, ReportInbox { rx })
}

/// External collaborators, injected at construction.
pub struct EngineDeps {
    pub record_store: Arc<dyn RecordStore>,
    pub event_store: Arc<dyn EventStore>,
    pub notifier: Arc<dyn Notifier>,
    pub dispatcher: Arc<dyn SpecialistDispatcher>,
    pub context: Arc<dyn ContextProvider>,
    pub reports: Option<ReportInbox>,
}

/// Everything the engine knows about one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestView {
    pub request: ServiceRequest,
    pub classification: Option<Classification>,
    pub priority: Option<PriorityAssignment>,
    pub plan: Option<DelegationPlan>,
    pub ticket: Option<EscalationTicket>,
    pub clock: Option<ClockSnapshot>,
    pub breached: bool,
}

struct RequestRecord {
    request: ServiceRequest,
    classification: Option<Classification>,
    priority: Option<PriorityAssignment>,
    plan: Option<DelegationPlan>,
    /// Failed assignments awaiting the next replan.
    pending_failures: Vec<Uuid>,
    replan_scheduled: bool,
    breached: bool,
}

impl RequestRecord {
    fn new(request: ServiceRequest) -> Self {
        Self {
            request,
            classification: None,
            priority: None,
            plan: None,
            pending_failures: Vec::new(),
            replan_scheduled: false,
            breached: false,
        }
    }

    fn is_settled(&self) -> bool {
        self.request.state.is_terminal() || self.request.halted
    }

    fn view(&self, ticket: Option<EscalationTicket>, clock: Option<ClockSnapshot>) -> RequestView {
        RequestView {
            request: self.request.clone(),
            classification: self.classification.clone(),
            priority: self.priority.clone(),
            plan: self.plan.clone(),
            ticket,
            clock,
            breached: self.breached,
        }
    }

    fn snapshot(&self) -> EscalationSnapshot {
        EscalationSnapshot {
            classification: self
                .classification
                .clone()
                .unwrap_or_else(Classification::fallback),
            priority: self.priority.clone(),
            plan: self.plan.clone(),
            taken_at: Utc::now(),
        }
    }
}

type SharedRecord = Arc<Mutex<RequestRecord>>;

/// Final views of requests that left the live table, oldest first.
struct SettledViews {
    capacity: usize,
    order: VecDeque<Uuid>,
    views: HashMap<Uuid, RequestView>,
}

impl SettledViews {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            views: HashMap::new(),
        }
    }

    fn insert(&mut self, view: RequestView) {
        if self.capacity == 0 {
            return;
        }
        let request_id = view.request.id;
        if self.views.insert(request_id, view).is_none() {
            self.order.push_back(request_id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.views.remove(&oldest);
            }
        }
    }

    fn get(&self, request_id: Uuid) -> Option<RequestView> {
        self.views.get(&request_id).cloned()
    }

    fn contains(&self, request_id: Uuid) -> bool {
        self.views.contains_key(&request_id)
    }
}

struct EngineInner {
    config: Config,
    classifier: Classifier,
    resolver: PriorityResolver,
    planner: DelegationPlanner,
    capacity: Arc<CapacityRegistry>,
    clocks: SlaClockService,
    escalations: EscalationManager,
    monitor: HarmonyMonitor,
    persistence: PersistenceGate,
    bus: Arc<EventBus>,
    dispatcher: Arc<dyn SpecialistDispatcher>,
    requests: RwLock<HashMap<Uuid, SharedRecord>>,
    settled: std::sync::Mutex<SettledViews>,
}

/// Handle to a running engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
    tasks: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
}

impl Engine {
    /// Build the engine and start its background loops.
    pub fn start(config: Config, rules: RuleBook, deps: EngineDeps) -> Result<Self, RuleBookError> {
        rules.validate()?;
        let rules = Arc::new(rules);

        let bus = Arc::new(
            EventBus::new(EventBusConfig {
                channel_capacity: config.engine.event_channel_capacity.max(1),
                persist_events: true,
            })
            .with_store(deps.event_store.clone()),
        );

        let (persistence, persistence_task) = PersistenceGate::spawn(
            deps.record_store,
            RetryPolicy::from(&config.persistence),
            bus.clone(),
        );

        let classifier = Classifier::new(rules.clone())?;
        let resolver = PriorityResolver::new(
            &rules,
            deps.context.clone(),
            &config.vip_contacts,
            Duration::from_millis(config.engine.context_lookup_timeout_ms),
            config.engine.repeat_escalation_threshold,
        )?;
        let capacity = Arc::new(CapacityRegistry::from_rules(&rules));
        let planner = DelegationPlanner::new(
            rules.clone(),
            capacity.clone(),
            config.engine.max_replans,
        );

        let (signal_tx, signal_rx) = mpsc::channel(config.engine.event_channel_capacity.max(1));
        let clocks = SlaClockService::new(
            BusinessCalendar::from_config(&config.business_hours),
            bus.clone(),
            signal_tx,
        );

        let escalations = EscalationManager::new(
            bus.clone(),
            persistence.clone(),
            deps.notifier,
            config.notifications.channel.clone(),
            RetryPolicy::from(&config.notifications),
            deps.context,
        );

        let settled = SettledViews::new(config.engine.retained_settled);
        let inner = Arc::new(EngineInner {
            monitor: HarmonyMonitor::new(deps.event_store),
            config,
            classifier,
            resolver,
            planner,
            capacity,
            clocks,
            escalations,
            persistence,
            bus,
            dispatcher: deps.dispatcher,
            requests: RwLock::new(HashMap::new()),
            settled: std::sync::Mutex::new(settled),
        });

        let mut tasks = vec![persistence_task, tokio::spawn(signal_loop(inner.clone(), signal_rx))];
        if let Some(inbox) = deps.reports {
            tasks.push(tokio::spawn(report_loop(inner.clone(), inbox)));
        }

        tracing::info!(
            max_replans = inner.config.engine.max_replans,
            "Request engine started"
        );

        Ok(Self {
            inner,
            tasks: Arc::new(std::sync::Mutex::new(tasks)),
        })
    }

    /// Accept a request. Returns immediately; processing continues in the
    /// background.
    pub async fn ingest(&self, payload: IngestPayload) -> IngestResponse {
        self.inner.ingest(payload).await
    }

    /// Specialist callback.
    pub async fn report(&self, report: SpecialistReport) -> DomainResult<()> {
        self.inner.report(report).await
    }

    /// Close a request without resolution.
    pub async fn close(&self, request_id: Uuid, reason: &str) -> DomainResult<()> {
        self.inner.close(request_id, reason).await
    }

    /// Assign the request's escalation ticket to a human operator.
    pub async fn claim_ticket(&self, request_id: Uuid, operator: &str) -> DomainResult<EscalationTicket> {
        let ticket = self.ticket_of(request_id).await?;
        self.inner.escalations.claim(ticket.id, operator).await
    }

    /// Resolve the request's ticket; this also resolves the request.
    pub async fn resolve_ticket(
        &self,
        request_id: Uuid,
        resolution: Option<String>,
    ) -> DomainResult<EscalationTicket> {
        let ticket = self.ticket_of(request_id).await?;
        self.inner.resolve_ticket(ticket.id, resolution).await
    }

    async fn ticket_of(&self, request_id: Uuid) -> DomainResult<EscalationTicket> {
        if self.inner.record(request_id).await.is_none() {
            if self.inner.lock_settled().contains(request_id) {
                return Err(DomainError::ValidationFailed(format!(
                    "request {request_id} is finished"
                )));
            }
            return Err(DomainError::RequestNotFound(request_id));
        }
        self.inner
            .escalations
            .ticket_for_request(request_id)
            .await
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!("request {request_id} has no escalation ticket"))
            })
    }

    pub async fn get_metrics(&self, window: Duration) -> Result<HarmonyMetrics, EventStoreError> {
        let mut metrics = self.inner.monitor.get_metrics(window).await?;
        metrics.persistence_degraded |= self.inner.persistence.is_degraded();
        Ok(metrics)
    }

    /// Current view of a request. Finished requests are answered from the
    /// retained final views.
    pub async fn request(&self, request_id: Uuid) -> Option<RequestView> {
        if let Some(shared) = self.inner.record(request_id).await {
            let record = shared.lock().await;
            if !record.request.state.is_terminal() {
                return Some(record.view(
                    self.inner.escalations.ticket_for_request(request_id).await,
                    self.inner.clocks.snapshot(request_id),
                ));
            }
        }
        self.inner.lock_settled().get(request_id)
    }

    /// Requests still held in the live table.
    pub async fn live_requests(&self) -> usize {
        self.inner.requests.read().await.len()
    }

    pub async fn tracked_tickets(&self) -> usize {
        self.inner.escalations.tracked().await
    }

    pub async fn open_tickets(&self) -> Vec<EscalationTicket> {
        self.inner.escalations.open_tickets().await
    }

    /// Wait until the request satisfies `done` or `timeout` elapses.
    pub async fn wait_for(
        &self,
        request_id: Uuid,
        timeout: Duration,
        done: impl Fn(&RequestView) -> bool,
    ) -> Option<RequestView> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let view = self.request(request_id).await;
            if view.as_ref().is_some_and(&done) || tokio::time::Instant::now() >= deadline {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn capacity(&self) -> &CapacityRegistry {
        &self.inner.capacity
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn persistence_degraded(&self) -> bool {
        self.inner.persistence.is_degraded()
    }

    /// Drain queued writes and notifications, then stop background loops.
    pub async fn shutdown(&self) {
        self.inner.persistence.flush().await;
        self.inner.escalations.wait_for_notifications().await;
        let tasks: Vec<_> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for task in &tasks {
            task.abort();
        }
        futures::future::join_all(tasks).await;
        tracing::info!("Request engine stopped");
    }
}

async fn signal_loop(inner: Arc<EngineInner>, mut rx: mpsc::Receiver<ClockSignal>) {
    while let Some(signal) = rx.recv().await {
        let inner = inner.clone();
        tokio::spawn(async move { inner.handle_clock_signal(signal).await });
    }
}

async fn report_loop(inner: Arc<EngineInner>, mut inbox: ReportInbox) {
    while let Some(report) = inbox.rx.recv().await {
        if let Err(e) = inner.report(report).await {
            tracing::warn!(error = %e, "Specialist report rejected");
        }
    }
}

impl EngineInner {
    async fn record(&self, request_id: Uuid) -> Option<SharedRecord> {
        self.requests.read().await.get(&request_id).cloned()
    }

    async fn ingest(self: &Arc<Self>, payload: IngestPayload) -> IngestResponse {
        let request_id = payload.id.unwrap_or_else(Uuid::new_v4);
        let reject = |reason: &str| {
            tracing::warn!(%request_id, reason, "Request rejected at ingestion");
            IngestResponse {
                request_id,
                accepted: false,
                reason: Some(reason.to_string()),
            }
        };

        if payload.raw_text.trim().is_empty() {
            return reject("raw_text is empty");
        }
        if payload.business_context.trim().is_empty() {
            return reject("business_context is empty");
        }

        let request = ServiceRequest::from_payload(IngestPayload {
            id: Some(request_id),
            ..payload
        });
        {
            let mut requests = self.requests.write().await;
            if requests.contains_key(&request_id) || self.lock_settled().contains(request_id) {
                drop(requests);
                return reject("duplicate request id");
            }
            requests.insert(
                request_id,
                Arc::new(Mutex::new(RequestRecord::new(request.clone()))),
            );
        }

        tracing::info!(
            %request_id,
            business_context = %request.business_context,
            channel = %request.channel,
            "Request received"
        );
        self.persistence
            .persist(EntityKind::ServiceRequest, request_id, &request);
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Intake,
                Some(request_id),
                EventPayload::RequestReceived {
                    request_id,
                    business_context: request.business_context.clone(),
                    channel: request.channel.clone(),
                },
            )
            .await;

        let inner = self.clone();
        tokio::spawn(async move { inner.process(request_id).await });

        IngestResponse {
            request_id,
            accepted: true,
            reason: None,
        }
    }

    async fn process(self: &Arc<Self>, request_id: Uuid) {
        let Some(shared) = self.record(request_id).await else {
            return;
        };
        let mut record = shared.lock().await;
        if record.is_settled() {
            return;
        }
        if let Err(e) = self.run_pipeline(&mut record).await {
            self.halt(&mut record, e).await;
        }
    }

    async fn run_pipeline(self: &Arc<Self>, record: &mut RequestRecord) -> DomainResult<()> {
        let request_id = record.request.id;

        if record.classification.is_some() {
            return Err(DomainError::InvariantViolation {
                request_id,
                detail: "request already classified".to_string(),
            });
        }
        let classification = self.classifier.classify(&record.request);
        self.set_state(record, RequestState::Classified)?;
        self.persistence
            .persist(EntityKind::Classification, request_id, &classification);
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Classification,
                Some(request_id),
                EventPayload::RequestClassified {
                    request_id,
                    category: classification.category.clone(),
                    tier: classification.tier,
                    confidence: classification.confidence,
                    fallback: classification.is_fallback(),
                },
            )
            .await;
        record.classification = Some(classification.clone());

        let priority = self
            .resolver
            .resolve(
                &classification,
                &record.request.business_context,
                record.request.contact(),
            )
            .await;
        self.set_state(record, RequestState::Prioritized)?;
        tracing::info!(
            %request_id,
            category = %classification.category,
            tier = %classification.tier,
            priority = %priority.class,
            "Request prioritized"
        );
        self.persistence
            .persist(EntityKind::PriorityAssignment, request_id, &priority);
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Classification,
                Some(request_id),
                EventPayload::PriorityAssigned {
                    request_id,
                    class: priority.class,
                    base_class: priority.base_class,
                    context_degraded: priority.context_degraded,
                },
            )
            .await;
        record.priority = Some(priority.clone());

        if record.plan.is_some() {
            return Err(DomainError::InvariantViolation {
                request_id,
                detail: "a delegation plan already exists".to_string(),
            });
        }
        let plan = self
            .planner
            .plan(request_id, &classification.category, classification.tier);
        self.set_state(record, RequestState::Delegated)?;
        self.persistence
            .persist(EntityKind::DelegationPlan, request_id, &plan);
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Delegation,
                Some(request_id),
                EventPayload::PlanCreated {
                    request_id,
                    revision: plan.revision,
                    roles: plan.roles(),
                    immediate_escalation: plan.immediate_escalation,
                },
            )
            .await;
        let immediate = plan.immediate_escalation;
        let assignments = plan.assignments.clone();
        record.plan = Some(plan);

        self.clocks.start(request_id, &priority).await;

        if immediate {
            let (reason, detail) = match &classification.hard_trigger {
                Some(trigger) => (TriggerReason::HardTrigger, trigger.describe()),
                None => (
                    TriggerReason::Tier4,
                    format!("tier-4 {} request", classification.category),
                ),
            };
            return self.escalate(record, reason, detail).await;
        }

        self.dispatch(record, &assignments).await;

        if let Some(keyword) = classification.escalation_keyword.as_deref() {
            if !record.request.state.is_terminal() {
                self.escalate(
                    record,
                    TriggerReason::HardTrigger,
                    format!("escalation keyword \"{keyword}\""),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Hand assignments to specialists. A dispatch error counts as a
    /// `failed` report for that assignment.
    async fn dispatch(self: &Arc<Self>, record: &mut RequestRecord, assignments: &[Assignment]) {
        let request_id = record.request.id;
        for assignment in assignments {
            let context = self.assignment_context(record, assignment);
            match self.dispatcher.assign(context).await {
                Ok(()) => {
                    tracing::debug!(%request_id, role = %assignment.role, "Specialist dispatched");
                    self.bus
                        .emit(
                            EventSeverity::Debug,
                            EventCategory::Delegation,
                            Some(request_id),
                            EventPayload::SpecialistDispatched {
                                request_id,
                                role: assignment.role,
                            },
                        )
                        .await;
                }
                Err(e) => {
                    tracing::warn!(%request_id, role = %assignment.role, error = %e, "Dispatch failed");
                    if let Some(plan) = record.plan.as_mut() {
                        if let Some(a) = plan.assignments.iter_mut().find(|a| a.id == assignment.id) {
                            a.status = AssignmentStatus::Failed;
                            a.updated_at = Some(Utc::now());
                            self.capacity.release(a.role);
                        }
                    }
                    self.note_failure(record, assignment.id);
                }
            }
        }
        if let Some(plan) = &record.plan {
            self.persistence
                .persist(EntityKind::DelegationPlan, request_id, plan);
        }
    }

    fn assignment_context(&self, record: &RequestRecord, assignment: &Assignment) -> AssignmentContext {
        let classification = record
            .classification
            .clone()
            .unwrap_or_else(Classification::fallback);
        let request = &record.request;
        AssignmentContext {
            request_id: request.id,
            assignment_id: assignment.id,
            role: assignment.role,
            required: assignment.required,
            revision: assignment.revision,
            category: classification.category,
            tier: classification.tier,
            priority: record
                .priority
                .as_ref()
                .map_or(PriorityClass::Low, |p| p.class),
            business_context: request.business_context.clone(),
            raw_text: request.raw_text.clone(),
            metadata: request.metadata.clone(),
            lead_score: classification.lead_score,
        }
    }

    async fn report(self: &Arc<Self>, report: SpecialistReport) -> DomainResult<()> {
        let request_id = report.request_id;
        let Some(shared) = self.record(request_id).await else {
            if self.lock_settled().contains(request_id) {
                tracing::debug!(%request_id, role = %report.role, "Report for finished request ignored");
                return Ok(());
            }
            return Err(DomainError::RequestNotFound(request_id));
        };
        let mut record = shared.lock().await;

        if record.request.halted {
            return Err(DomainError::RequestHalted(request_id));
        }
        if record.request.state.is_terminal() {
            tracing::debug!(%request_id, role = %report.role, "Report for finished request ignored");
            return Ok(());
        }

        let plan = record.plan.as_mut().ok_or_else(|| {
            DomainError::ValidationFailed(format!("request {request_id} has no delegation plan"))
        })?;
        let assignment = plan.find_open_mut(report.role).ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "no open {} assignment for request {request_id}",
                report.role
            ))
        })?;
        let assignment_id = assignment.id;
        assignment.status = report.status.into();
        assignment.updated_at = Some(Utc::now());
        if assignment.status.is_settled() {
            self.capacity.release(report.role);
        }
        self.persistence
            .persist(EntityKind::DelegationPlan, request_id, &*plan);

        tracing::info!(%request_id, role = %report.role, status = ?report.status, "Specialist reported");
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Delegation,
                Some(request_id),
                EventPayload::SpecialistReported {
                    request_id,
                    role: report.role,
                    status: report.status,
                },
            )
            .await;

        if record.request.state == RequestState::Delegated
            && matches!(
                report.status,
                SpecialistStatus::Acknowledged | SpecialistStatus::Completed
            )
        {
            self.set_state(&mut record, RequestState::InProgress)?;
        }

        match report.status {
            SpecialistStatus::Failed => self.note_failure(&mut record, assignment_id),
            SpecialistStatus::Completed | SpecialistStatus::Declined => {
                self.check_progress(&mut record).await?;
            }
            SpecialistStatus::Acknowledged => {}
        }
        Ok(())
    }

    /// Resolve the request once its plan is fulfilled. A plan whose
    /// assignments all declined is left to the escalation deadline.
    async fn check_progress(self: &Arc<Self>, record: &mut RequestRecord) -> DomainResult<()> {
        if record.request.state == RequestState::Escalated || !record.pending_failures.is_empty() {
            return Ok(());
        }
        let Some(plan) = &record.plan else {
            return Ok(());
        };

        if plan.is_fulfilled() {
            return self.resolve_by_specialists(record).await;
        }
        if plan.active().all(|a| a.status.is_settled()) {
            tracing::warn!(
                request_id = %record.request.id,
                "Every specialist declined; waiting for escalation deadline"
            );
        }
        Ok(())
    }

    fn note_failure(self: &Arc<Self>, record: &mut RequestRecord, assignment_id: Uuid) {
        record.pending_failures.push(assignment_id);
        if record.replan_scheduled {
            return;
        }
        record.replan_scheduled = true;

        let inner = self.clone();
        let request_id = record.request.id;
        let window = Duration::from_millis(self.config.engine.replan_coalesce_ms);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            inner.run_replan(request_id).await;
        });
    }

    async fn run_replan(self: &Arc<Self>, request_id: Uuid) {
        let Some(shared) = self.record(request_id).await else {
            return;
        };
        let mut record = shared.lock().await;
        record.replan_scheduled = false;
        let failed = std::mem::take(&mut record.pending_failures);
        if failed.is_empty() || record.is_settled() || record.request.state == RequestState::Escalated {
            return;
        }
        if record.plan.as_ref().is_some_and(DelegationPlan::is_fulfilled) {
            tracing::debug!(%request_id, "Plan fulfilled without the failed assignments");
            if let Err(e) = self.check_progress(&mut record).await {
                self.halt(&mut record, e).await;
            }
            return;
        }

        let category = record
            .classification
            .as_ref()
            .map(|c| c.category.clone())
            .unwrap_or_default();
        let Some(plan) = record.plan.as_mut() else {
            return;
        };
        let replaced: Vec<_> = plan
            .assignments
            .iter()
            .filter(|a| failed.contains(&a.id))
            .map(|a| a.role)
            .collect();

        match self.planner.replan(plan, &category, &failed) {
            Ok(replacements) => {
                let revision = plan.revision;
                tracing::info!(
                    %request_id,
                    revision,
                    replaced = ?replaced,
                    replacements = ?replacements.iter().map(|a| a.role).collect::<Vec<_>>(),
                    "Delegation replanned"
                );
                self.persistence
                    .persist(EntityKind::DelegationPlan, request_id, &*plan);
                self.bus
                    .emit(
                        EventSeverity::Info,
                        EventCategory::Delegation,
                        Some(request_id),
                        EventPayload::Replanned {
                            request_id,
                            revision,
                            replaced,
                            replacements: replacements.iter().map(|a| a.role).collect(),
                        },
                    )
                    .await;
                self.dispatch(&mut record, &replacements).await;
                if let Err(e) = self.check_progress(&mut record).await {
                    self.halt(&mut record, e).await;
                }
            }
            Err(ReplanError::UnknownAssignment(id)) => {
                let error = DomainError::InvariantViolation {
                    request_id,
                    detail: format!("failed assignment {id} missing from plan"),
                };
                self.halt(&mut record, error).await;
            }
            Err(e) => {
                tracing::warn!(%request_id, error = %e, "Replanning exhausted");
                if let Err(e) = self
                    .escalate(&mut record, TriggerReason::ReplanExhausted, e.to_string())
                    .await
                {
                    self.halt(&mut record, e).await;
                }
            }
        }
    }

    async fn resolve_by_specialists(self: &Arc<Self>, record: &mut RequestRecord) -> DomainResult<()> {
        let request_id = record.request.id;
        if self.clocks.cancel(request_id).await == CancelOutcome::AlreadyBreached {
            // Breach wins; the pending escalation signal takes over.
            record.breached = true;
            tracing::info!(%request_id, "Plan fulfilled after escalation deadline");
            return Ok(());
        }
        self.set_state(record, RequestState::Resolved)?;
        self.release_open_assignments(record);
        tracing::info!(%request_id, "Request resolved by specialists");
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Resolution,
                Some(request_id),
                EventPayload::RequestResolved {
                    request_id,
                    by: ResolvedBy::Specialist,
                },
            )
            .await;
        self.retire(record).await;
        Ok(())
    }

    async fn escalate(
        self: &Arc<Self>,
        record: &mut RequestRecord,
        reason: TriggerReason,
        detail: String,
    ) -> DomainResult<()> {
        let request_id = record.request.id;
        let priority = record
            .priority
            .as_ref()
            .map_or(PriorityClass::Urgent, |p| p.class);
        let outcome = self
            .escalations
            .escalate(EscalationTrigger {
                request_id,
                reason,
                detail,
                priority,
                snapshot: record.snapshot(),
                contact: record.request.contact().map(str::to_string),
            })
            .await;

        if !matches!(outcome, EscalationOutcome::AlreadyResolved(_))
            && record.request.state != RequestState::Escalated
        {
            self.set_state(record, RequestState::Escalated)?;
        }
        Ok(())
    }

    async fn handle_clock_signal(self: &Arc<Self>, signal: ClockSignal) {
        let request_id = signal.request_id();
        let Some(shared) = self.record(request_id).await else {
            return;
        };
        let mut record = shared.lock().await;

        match signal {
            ClockSignal::InitialResponseDue { .. } => {
                if record.is_settled() {
                    return;
                }
                let acknowledged = record.request.state == RequestState::Escalated
                    || record.plan.as_ref().is_some_and(DelegationPlan::has_acknowledgement);
                if !acknowledged {
                    tracing::warn!(%request_id, "No specialist acknowledged before initial-response deadline");
                }
                self.bus
                    .emit(
                        if acknowledged {
                            EventSeverity::Info
                        } else {
                            EventSeverity::Warning
                        },
                        EventCategory::Sla,
                        Some(request_id),
                        EventPayload::InitialResponseDue {
                            request_id,
                            acknowledged,
                        },
                    )
                    .await;
            }
            ClockSignal::EscalationDue { .. } => {
                record.breached = true;
                if record.is_settled() {
                    tracing::debug!(%request_id, "Breach recorded for finished request");
                    return;
                }
                let detail = format!(
                    "escalation deadline passed in state {}",
                    record.request.state
                );
                if let Err(e) = self.escalate(&mut record, TriggerReason::Breach, detail).await {
                    self.halt(&mut record, e).await;
                }
            }
        }
    }

    async fn resolve_ticket(
        self: &Arc<Self>,
        ticket_id: Uuid,
        resolution: Option<String>,
    ) -> DomainResult<EscalationTicket> {
        let ticket = self.escalations.resolve(ticket_id, resolution).await?;
        let request_id = ticket.request_id;
        let shared = self
            .record(request_id)
            .await
            .ok_or(DomainError::RequestNotFound(request_id))?;
        let mut record = shared.lock().await;

        if record.request.state.is_terminal() {
            return Ok(ticket);
        }
        if self.clocks.cancel(request_id).await == CancelOutcome::AlreadyBreached {
            record.breached = true;
        }
        self.set_state(&mut record, RequestState::Resolved)?;
        self.release_open_assignments(&mut record);
        tracing::info!(%request_id, %ticket_id, "Request resolved by operator");
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Resolution,
                Some(request_id),
                EventPayload::RequestResolved {
                    request_id,
                    by: ResolvedBy::Operator,
                },
            )
            .await;
        self.retire(&record).await;
        Ok(ticket)
    }

    async fn close(self: &Arc<Self>, request_id: Uuid, reason: &str) -> DomainResult<()> {
        let Some(shared) = self.record(request_id).await else {
            let finished = self.lock_settled().get(request_id);
            return Err(match finished {
                Some(view) => DomainError::InvalidStateTransition {
                    from: view.request.state.to_string(),
                    to: RequestState::Closed.to_string(),
                    reason: format!("request {request_id} is finished"),
                },
                None => DomainError::RequestNotFound(request_id),
            });
        };
        let mut record = shared.lock().await;

        let from = record.request.state;
        if !from.can_transition_to(RequestState::Closed) {
            return Err(DomainError::InvalidStateTransition {
                from: from.to_string(),
                to: RequestState::Closed.to_string(),
                reason: format!("request {request_id}"),
            });
        }
        if self.clocks.cancel(request_id).await == CancelOutcome::AlreadyBreached {
            // The pending escalation signal files the breach ticket.
            record.breached = true;
            tracing::info!(%request_id, reason, "Close refused after escalation deadline");
            return Err(DomainError::InvalidStateTransition {
                from: from.to_string(),
                to: RequestState::Closed.to_string(),
                reason: format!("request {request_id} breached its escalation deadline"),
            });
        }
        self.set_state(&mut record, RequestState::Closed)?;
        self.release_open_assignments(&mut record);
        tracing::info!(%request_id, reason, "Request closed");
        self.bus
            .emit(
                EventSeverity::Info,
                EventCategory::Resolution,
                Some(request_id),
                EventPayload::RequestClosed {
                    request_id,
                    reason: reason.to_string(),
                },
            )
            .await;
        self.retire(&record).await;
        Ok(())
    }

    /// Stop processing one request after an unrecoverable error.
    async fn halt(self: &Arc<Self>, record: &mut RequestRecord, error: DomainError) {
        let request_id = record.request.id;
        tracing::error!(%request_id, error = %error, "Request halted");
        record.request.halted = true;
        record.pending_failures.clear();
        self.clocks.cancel(request_id).await;
        self.release_open_assignments(record);
        self.persistence.update(
            EntityKind::ServiceRequest,
            request_id,
            json!({ "halted": true, "updated_at": Utc::now() }),
        );
        self.bus
            .emit(
                EventSeverity::Error,
                EventCategory::Health,
                Some(request_id),
                EventPayload::RequestHalted {
                    request_id,
                    detail: error.to_string(),
                },
            )
            .await;
    }

    /// Move a finished request out of the live table. Its final view stays
    /// queryable until newer ones push it out.
    async fn retire(&self, record: &RequestRecord) {
        let request_id = record.request.id;
        let ticket = self.escalations.release(request_id).await;
        self.lock_settled().insert(record.view(ticket, None));
        self.requests.write().await.remove(&request_id);
        tracing::debug!(%request_id, state = %record.request.state, "Request retired");
    }

    fn lock_settled(&self) -> std::sync::MutexGuard<'_, SettledViews> {
        self.settled.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, record: &mut RequestRecord, next: RequestState) -> DomainResult<()> {
        record.request.transition_to(next)?;
        self.persistence.update(
            EntityKind::ServiceRequest,
            record.request.id,
            json!({ "state": next, "updated_at": record.request.updated_at }),
        );
        Ok(())
    }

    fn release_open_assignments(&self, record: &mut RequestRecord) {
        let Some(plan) = record.plan.as_mut() else {
            return;
        };
        for assignment in plan
            .assignments
            .iter_mut()
            .filter(|a| !a.status.is_settled())
        {
            self.capacity.release(assignment.role);
        }
    }
}
