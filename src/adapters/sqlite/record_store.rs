//! SQLite implementation of the Record Store.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::ports::{merge_patch, EntityKind, RecordStore, StoreError};

/// Entities stored as JSON documents keyed by kind and id.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ids of every stored entity of `kind`.
    pub async fn list_ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM records WHERE kind = ? ORDER BY updated_at")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.into_iter()
            .map(|(id,)| Uuid::parse_str(&id).map_err(|e| StoreError::Serialization(e.to_string())))
            .collect()
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn persist(&self, kind: EntityKind, id: Uuid, entity: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(entity).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO records (kind, id, body, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(id.to_string())
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, id: Uuid) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(|(body,)| serde_json::from_str(&body))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn update(&self, kind: EntityKind, id: Uuid, patch: &Value) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;
        let Some((body,)) = row else {
            return Err(StoreError::NotFound { kind, id });
        };

        let mut entity: Value =
            serde_json::from_str(&body).map_err(|e| StoreError::Serialization(e.to_string()))?;
        merge_patch(&mut entity, patch);
        let body = serde_json::to_string(&entity).map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query("UPDATE records SET body = ?, updated_at = ? WHERE kind = ? AND id = ?")
            .bind(body)
            .bind(Utc::now().to_rfc3339())
            .bind(kind.as_str())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)
    }
}
