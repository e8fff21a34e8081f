//! SQLite EventStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{build_query, build_schema};
use crate::events::{Event, NewEvent};
use crate::storage::schema::{create_events_position_index, create_events_table, Events};
use crate::storage::{AppendNotification, EventFilter, EventStore, Result, StorageError};

const NOTIFY_CAPACITY: usize = 1024;

/// SQLite implementation of EventStore.
pub struct SqliteEventStore {
    pool: SqlitePool,
    notifier: broadcast::Sender<AppendNotification>,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { pool, notifier }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(&build_schema(create_events_table()))
            .execute(&self.pool)
            .await?;
        sqlx::query(&build_schema(create_events_position_index()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn max_of(conn: &mut SqliteConnection, query: String) -> Result<u64> {
        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        let max: Option<i64> = row.and_then(|r| r.get(0));
        Ok(max.map(|m| m as u64).unwrap_or(0))
    }

    /// Insert events within an already-started transaction.
    async fn insert_events(conn: &mut SqliteConnection, events: Vec<NewEvent>) -> Result<Vec<Event>> {
        let mut position = Self::max_of(
            conn,
            build_query(
                Query::select()
                    .expr(Expr::col(Events::Position).max())
                    .from(Events::Table),
            ),
        )
        .await?;

        let mut sequences: HashMap<(String, String, String), u64> = HashMap::new();
        let mut committed = Vec::with_capacity(events.len());

        for new in events {
            let key = (
                new.instance_id.clone(),
                new.aggregate_type.clone(),
                new.aggregate_id.clone(),
            );
            let sequence = match sequences.get(&key) {
                Some(last) => last + 1,
                None => {
                    let last = Self::max_of(
                        conn,
                        build_query(
                            Query::select()
                                .expr(Expr::col(Events::Sequence).max())
                                .from(Events::Table)
                                .and_where(Expr::col(Events::InstanceId).eq(&new.instance_id))
                                .and_where(Expr::col(Events::AggregateType).eq(&new.aggregate_type))
                                .and_where(Expr::col(Events::AggregateId).eq(&new.aggregate_id)),
                        ),
                    )
                    .await?;
                    last + 1
                }
            };
            sequences.insert(key, sequence);
            position += 1;

            let event = Event {
                instance_id: new.instance_id,
                aggregate_type: new.aggregate_type,
                aggregate_id: new.aggregate_id,
                resource_owner: new.resource_owner,
                sequence,
                position,
                event_type: new.event_type,
                created_at: new.created_at.unwrap_or_else(Utc::now),
                payload: new.payload,
            };

            let query = build_query(
                Query::insert()
                    .into_table(Events::Table)
                    .columns([
                        Events::InstanceId,
                        Events::AggregateType,
                        Events::AggregateId,
                        Events::ResourceOwner,
                        Events::Sequence,
                        Events::Position,
                        Events::EventType,
                        Events::CreatedAt,
                        Events::Payload,
                    ])
                    .values_panic([
                        event.instance_id.as_str().into(),
                        event.aggregate_type.as_str().into(),
                        event.aggregate_id.as_str().into(),
                        event.resource_owner.as_str().into(),
                        (event.sequence as i64).into(),
                        (event.position as i64).into(),
                        event.event_type.as_str().into(),
                        event.created_at.to_rfc3339().into(),
                        serde_json::to_string(&event.payload)?.into(),
                    ]),
            );
            sqlx::query(&query).execute(&mut *conn).await?;
            committed.push(event);
        }

        Ok(committed)
    }

    fn decode_row(row: &SqliteRow) -> Result<Event> {
        let created_at: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StorageError::InvalidData(format!("created_at {created_at}: {e}")))?
            .with_timezone(&Utc);
        let payload: String = row.get("payload");
        let sequence: i64 = row.get("sequence");
        let position: i64 = row.get("position");

        Ok(Event {
            instance_id: row.get("instance_id"),
            aggregate_type: row.get("aggregate_type"),
            aggregate_id: row.get("aggregate_id"),
            resource_owner: row.get("resource_owner"),
            sequence: sequence as u64,
            position: position as u64,
            event_type: row.get("event_type"),
            created_at,
            payload: serde_json::from_str(&payload)?,
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, events: Vec<NewEvent>) -> Result<Vec<Event>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        // BEGIN IMMEDIATE acquires the write lock upfront, so concurrent
        // appenders serialize on position assignment instead of deadlocking.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let committed = match Self::insert_events(&mut *tx, events).await {
            Ok(committed) => committed,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Append rollback failed");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        let mut latest: HashMap<&str, u64> = HashMap::new();
        for event in &committed {
            latest.insert(&event.instance_id, event.position);
        }
        for (instance_id, position) in latest {
            // No receivers is fine.
            let _ = self.notifier.send(AppendNotification {
                instance_id: instance_id.to_string(),
                position,
            });
        }

        debug!(count = committed.len(), "Events appended");
        Ok(committed)
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        if filter.aggregate_types.is_empty() || filter.event_types.is_empty() || filter.limit == 0 {
            return Ok(Vec::new());
        }

        let query = build_query(
            Query::select()
                .columns([
                    Events::InstanceId,
                    Events::AggregateType,
                    Events::AggregateId,
                    Events::ResourceOwner,
                    Events::Sequence,
                    Events::Position,
                    Events::EventType,
                    Events::CreatedAt,
                    Events::Payload,
                ])
                .from(Events::Table)
                .and_where(Expr::col(Events::InstanceId).eq(&filter.instance_id))
                .and_where(Expr::col(Events::Position).gt(filter.after_position as i64))
                .and_where(Expr::col(Events::AggregateType).is_in(filter.aggregate_types.iter().cloned()))
                .and_where(Expr::col(Events::EventType).is_in(filter.event_types.iter().cloned()))
                .order_by(Events::Position, Order::Asc)
                .limit(filter.limit as u64),
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn instances(&self) -> Result<Vec<String>> {
        let query = build_query(
            Query::select()
                .distinct()
                .column(Events::InstanceId)
                .from(Events::Table)
                .order_by(Events::InstanceId, Order::Asc),
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("instance_id")).collect())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AppendNotification>> {
        Some(self.notifier.subscribe())
    }
}
