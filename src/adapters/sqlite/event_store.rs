//! SQLite implementation of the EventStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::time::Duration;

use crate::services::event_bus::{
    EventCategory, EventId, EventPayload, EventSeverity, SequenceNumber, UnifiedEvent,
};
use crate::services::event_store::{EventQuery, EventStore, EventStoreError};

/// SQLite-backed lifecycle event log.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn severity_rank(severity: EventSeverity) -> i64 {
        match severity {
            EventSeverity::Debug => 0,
            EventSeverity::Info => 1,
            EventSeverity::Warning => 2,
            EventSeverity::Error => 3,
            EventSeverity::Critical => 4,
        }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, event: &UnifiedEvent) -> Result<(), EventStoreError> {
        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO events (id, sequence, timestamp, timestamp_ms, severity, severity_rank, category, request_id, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.0.to_string())
        .bind(event.sequence.0 as i64)
        .bind(event.timestamp.to_rfc3339())
        .bind(event.timestamp.timestamp_millis())
        .bind(event.severity.as_str())
        .bind(Self::severity_rank(event.severity))
        .bind(event.category.as_str())
        .bind(event.request_id.map(|id| id.to_string()))
        .bind(payload_json)
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::AppendError(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<UnifiedEvent>, EventStoreError> {
        let mut sql: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, sequence, timestamp, severity, category, request_id, payload FROM events WHERE 1=1",
        );

        if let Some(since) = query.since_sequence {
            sql.push(" AND sequence >= ").push_bind(since.0 as i64);
        }
        if let Some(request_id) = query.request_id {
            sql.push(" AND request_id = ").push_bind(request_id.to_string());
        }
        if let Some(category) = query.category {
            sql.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(min_sev) = query.min_severity {
            sql.push(" AND severity_rank >= ").push_bind(Self::severity_rank(min_sev));
        }
        if let Some(since_time) = query.since_time {
            sql.push(" AND timestamp_ms >= ").push_bind(since_time.timestamp_millis());
        }
        if let Some(until_time) = query.until_time {
            sql.push(" AND timestamp_ms <= ").push_bind(until_time.timestamp_millis());
        }

        if query.ascending {
            sql.push(" ORDER BY sequence ASC, timestamp_ms ASC");
        } else {
            sql.push(" ORDER BY sequence DESC, timestamp_ms DESC");
        }
        if let Some(limit) = query.limit {
            sql.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = sql
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EventStoreError::QueryError(e.to_string()))?;

        rows.into_iter().map(row_to_event).collect()
    }

    async fn latest_sequence(&self) -> Result<Option<SequenceNumber>, EventStoreError> {
        let result: Option<(Option<i64>,)> = sqlx::query_as("SELECT MAX(sequence) FROM events")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        Ok(result
            .and_then(|(seq,)| seq)
            .and_then(|seq| u64::try_from(seq).ok())
            .map(SequenceNumber))
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn prune_older_than(&self, duration: Duration) -> Result<u64, EventStoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(duration).unwrap_or_default();
        let result = sqlx::query("DELETE FROM events WHERE timestamp_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

fn row_to_event(row: EventRow) -> Result<UnifiedEvent, EventStoreError> {
    let id = uuid::Uuid::parse_str(&row.id)
        .map_err(|e| EventStoreError::QueryError(format!("Invalid event ID: {e}")))?;

    let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
        .map_err(|e| EventStoreError::QueryError(format!("Invalid timestamp: {e}")))?
        .with_timezone(&Utc);

    let request_id = row
        .request_id
        .as_deref()
        .map(uuid::Uuid::parse_str)
        .transpose()
        .map_err(|e| EventStoreError::QueryError(format!("Invalid request_id: {e}")))?;

    let payload: EventPayload = serde_json::from_str(&row.payload)
        .map_err(|e| EventStoreError::SerializationError(format!("Invalid payload: {e}")))?;

    Ok(UnifiedEvent {
        id: EventId(id),
        sequence: SequenceNumber(u64::try_from(row.sequence).unwrap_or(0)),
        timestamp,
        severity: EventSeverity::from_str(&row.severity).unwrap_or(EventSeverity::Info),
        category: EventCategory::from_str(&row.category).unwrap_or(EventCategory::Health),
        request_id,
        payload,
    })
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    sequence: i64,
    timestamp: String,
    severity: String,
    category: String,
    request_id: Option<String>,
    payload: String,
}
