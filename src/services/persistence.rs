//! Write-behind persistence of engine entities.
//!
//! The in-memory state machine never waits on the Record Store. Writes are
//! queued and drained in order by one worker task that retries transient
//! failures. When a write is given up on, the gate reports
//! `persistence_degraded` until a later write succeeds. Entities queued but
//! not yet written are lost if the process exits in the meantime.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::event_bus::{EventBus, EventCategory, EventPayload, EventSeverity};
use super::retry::RetryPolicy;
use crate::domain::ports::{EntityKind, RecordStore, StoreError};

enum WriteOp {
    Persist {
        kind: EntityKind,
        id: Uuid,
        body: Value,
    },
    Update {
        kind: EntityKind,
        id: Uuid,
        patch: Value,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct PersistenceGate {
    tx: mpsc::UnboundedSender<WriteOp>,
    degraded: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl PersistenceGate {
    /// Start the write-behind worker.
    pub fn spawn(
        store: Arc<dyn RecordStore>,
        policy: RetryPolicy,
        bus: Arc<EventBus>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let degraded = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = Worker {
            store,
            policy,
            bus,
            degraded: degraded.clone(),
            pending: pending.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));
        (
            Self {
                tx,
                degraded,
                pending,
            },
            handle,
        )
    }

    /// Queue an insert-or-replace of `entity`.
    pub fn persist<T: Serialize>(&self, kind: EntityKind, id: Uuid, entity: &T) {
        match serde_json::to_value(entity) {
            Ok(body) => self.enqueue(WriteOp::Persist { kind, id, body }),
            Err(e) => tracing::error!(%kind, %id, error = %e, "Failed to serialize entity"),
        }
    }

    /// Queue a merge patch against a stored entity.
    pub fn update(&self, kind: EntityKind, id: Uuid, patch: Value) {
        self.enqueue(WriteOp::Update { kind, id, patch });
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Writes queued but not yet attempted to completion.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every write queued before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn enqueue(&self, op: WriteOp) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(op).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            tracing::error!("Persistence worker stopped, write dropped");
        }
    }
}

struct Worker {
    store: Arc<dyn RecordStore>,
    policy: RetryPolicy,
    bus: Arc<EventBus>,
    degraded: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
        while let Some(op) = rx.recv().await {
            match op {
                WriteOp::Flush(done) => {
                    let _ = done.send(());
                }
                WriteOp::Persist { kind, id, body } => {
                    let result = self
                        .policy
                        .execute(|| self.store.persist(kind, id, &body), StoreError::is_transient)
                        .await;
                    self.settle(kind, id, result.map_err(|e| e.last)).await;
                }
                WriteOp::Update { kind, id, patch } => {
                    let result = self
                        .policy
                        .execute(|| self.store.update(kind, id, &patch), StoreError::is_transient)
                        .await;
                    self.settle(kind, id, result.map_err(|e| e.last)).await;
                }
            }
        }
        tracing::debug!("Persistence worker stopped");
    }

    async fn settle(&self, kind: EntityKind, id: Uuid, result: Result<(), StoreError>) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        match result {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::AcqRel) {
                    tracing::info!("Record store writes recovered");
                    self.bus
                        .emit(
                            EventSeverity::Info,
                            EventCategory::Health,
                            None,
                            EventPayload::PersistenceRecovered,
                        )
                        .await;
                }
            }
            Err(e) => {
                tracing::error!(%kind, %id, error = %e, "Record store write failed");
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    self.bus
                        .emit(
                            EventSeverity::Error,
                            EventCategory::Health,
                            None,
                            EventPayload::PersistenceDegraded {
                                entity: format!("{kind}/{id}"),
                                error: e.to_string(),
                            },
                        )
                        .await;
                }
            }
        }
    }
}
