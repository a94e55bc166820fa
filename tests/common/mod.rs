//! Common test utilities for integration tests
//!
//! Builds an engine over in-memory adapters with a manual dispatcher, so
//! each test decides exactly when and how specialists report.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use harmony::adapters::{DirectoryContextProvider, InMemoryRecordStore, RecordingNotifier};
use harmony::domain::models::{
    AssignmentStatus, BusinessHoursConfig, Config, IngestPayload, RequestState, RuleBook,
    SpecialistRole, SpecialistStatus,
};
use harmony::domain::ports::{
    AssignmentContext, DispatchError, Notification, Notifier, NotifyError, RecordStore,
    SpecialistDispatcher, SpecialistReport,
};
use harmony::services::{Engine, EngineDeps, EventStore, InMemoryEventStore, RequestView};

/// Upper bound for waiting on asynchronous processing.
pub const WAIT: Duration = Duration::from_secs(5);

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Config with an always-open calendar and short retry/coalescing windows.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.business_hours = BusinessHoursConfig::always_open();
    config.engine.replan_coalesce_ms = 20;
    config.persistence.initial_backoff_ms = 1;
    config.persistence.max_backoff_ms = 5;
    config.notifications.initial_backoff_ms = 1;
    config
}

/// Dispatcher that records assignments and leaves reporting to the test.
#[derive(Default)]
pub struct ManualDispatcher {
    assigned: Mutex<Vec<AssignmentContext>>,
    unavailable: Vec<SpecialistRole>,
}

impl ManualDispatcher {
    pub fn refusing(roles: &[SpecialistRole]) -> Self {
        Self {
            assigned: Mutex::new(Vec::new()),
            unavailable: roles.to_vec(),
        }
    }

    pub async fn assigned(&self) -> Vec<AssignmentContext> {
        self.assigned.lock().await.clone()
    }
}

#[async_trait]
impl SpecialistDispatcher for ManualDispatcher {
    async fn assign(&self, context: AssignmentContext) -> Result<(), DispatchError> {
        if self.unavailable.contains(&context.role) {
            return Err(DispatchError::Unavailable(format!("{} is offline", context.role)));
        }
        self.assigned.lock().await.push(context);
        Ok(())
    }
}

/// Notifier whose channel is always down.
#[derive(Default)]
pub struct DownNotifier {
    attempts: std::sync::atomic::AtomicU32,
}

impl DownNotifier {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for DownNotifier {
    async fn notify(&self, _channel: &str, _notification: &Notification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Err(NotifyError::Unavailable("operator pager is down".to_string()))
    }
}

pub struct Harness {
    pub engine: Engine,
    pub dispatcher: Arc<ManualDispatcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub records: Arc<InMemoryRecordStore>,
    pub events: Arc<InMemoryEventStore>,
    pub context: Arc<DirectoryContextProvider>,
}

impl Harness {
    pub fn start() -> Self {
        Self::with(test_config(), ManualDispatcher::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with(config, ManualDispatcher::default())
    }

    pub fn with(config: Config, dispatcher: ManualDispatcher) -> Self {
        let dispatcher = Arc::new(dispatcher);
        let notifier = Arc::new(RecordingNotifier::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let context = Arc::new(DirectoryContextProvider::new().with_vips(["vip@example.com"]));

        let engine = Engine::start(
            config,
            RuleBook::builtin().expect("builtin rules are valid"),
            EngineDeps {
                record_store: records.clone() as Arc<dyn RecordStore>,
                event_store: events.clone() as Arc<dyn EventStore>,
                notifier: notifier.clone(),
                dispatcher: dispatcher.clone(),
                context: context.clone(),
                reports: None,
            },
        )
        .expect("engine starts");

        Self {
            engine,
            dispatcher,
            notifier,
            records,
            events,
            context,
        }
    }

    /// Ingest a request from a plain contact and wait for its pipeline run.
    pub async fn submit(&self, text: &str) -> RequestView {
        self.submit_payload(IngestPayload::new("acme", text)).await
    }

    pub async fn submit_payload(&self, payload: IngestPayload) -> RequestView {
        let response = self.engine.ingest(payload).await;
        assert!(response.accepted, "rejected: {:?}", response.reason);
        self.wait_until(response.request_id, |view| view.plan.is_some() || view.request.halted)
            .await
    }

    pub async fn wait_until(
        &self,
        request_id: Uuid,
        done: impl Fn(&RequestView) -> bool,
    ) -> RequestView {
        self.engine
            .wait_for(request_id, WAIT, done)
            .await
            .expect("request is known to the engine")
    }

    pub async fn wait_for_state(&self, request_id: Uuid, state: RequestState) -> RequestView {
        let view = self
            .wait_until(request_id, |view| view.request.state == state)
            .await;
        assert_eq!(view.request.state, state, "request never reached {state}");
        view
    }

    pub async fn view(&self, request_id: Uuid) -> RequestView {
        self.engine
            .request(request_id)
            .await
            .expect("request is known to the engine")
    }

    pub async fn report(&self, request_id: Uuid, role: SpecialistRole, status: SpecialistStatus) {
        self.engine
            .report(SpecialistReport {
                request_id,
                role,
                status,
                payload: json!({}),
            })
            .await
            .expect("report accepted");
    }

    /// Report `status` for every open assignment of the current plan.
    pub async fn report_all_open(&self, request_id: Uuid, status: SpecialistStatus) {
        for role in self.open_roles(request_id).await {
            self.report(request_id, role, status).await;
        }
    }

    pub async fn open_roles(&self, request_id: Uuid) -> Vec<SpecialistRole> {
        self.view(request_id)
            .await
            .plan
            .map(|plan| {
                plan.assignments
                    .iter()
                    .filter(|a| !a.status.is_settled())
                    .map(|a| a.role)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn assignment_statuses(&self, request_id: Uuid) -> Vec<(SpecialistRole, AssignmentStatus)> {
        self.view(request_id)
            .await
            .plan
            .map(|plan| plan.assignments.iter().map(|a| (a.role, a.status)).collect())
            .unwrap_or_default()
    }
}
