//! In-memory Record Store.
//!
//! Used by tests and by the CLI when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::ports::{merge_patch, EntityKind, RecordStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<(EntityKind, Uuid), Value>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities of `kind`.
    pub async fn count(&self, kind: EntityKind) -> usize {
        self.records
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn persist(&self, kind: EntityKind, id: Uuid, entity: &Value) -> Result<(), StoreError> {
        self.records.write().await.insert((kind, id), entity.clone());
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StoreError> {
        Ok(self.records.read().await.get(&(kind, id)).cloned())
    }

    async fn update(&self, kind: EntityKind, id: Uuid, patch: &Value) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let entity = records
            .get_mut(&(kind, id))
            .ok_or(StoreError::NotFound { kind, id })?;
        merge_patch(entity, patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_persist_replaces_entity() {
        let store = InMemoryRecordStore::new();
        let id = Uuid::new_v4();
        store
            .persist(EntityKind::DelegationPlan, id, &json!({"revision": 0}))
            .await
            .unwrap();
        store
            .persist(EntityKind::DelegationPlan, id, &json!({"revision": 1}))
            .await
            .unwrap();

        let stored = store.fetch(EntityKind::DelegationPlan, id).await.unwrap();
        assert_eq!(stored, Some(json!({"revision": 1})));
        assert_eq!(store.count(EntityKind::DelegationPlan).await, 1);
    }

    #[tokio::test]
    async fn test_kinds_are_separate_namespaces() {
        let store = InMemoryRecordStore::new();
        let id = Uuid::new_v4();
        store
            .persist(EntityKind::ServiceRequest, id, &json!({"state": "received"}))
            .await
            .unwrap();
        assert!(store
            .fetch(EntityKind::Classification, id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_missing_entity_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store
            .update(EntityKind::EscalationTicket, Uuid::new_v4(), &json!({"state": "resolved"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
