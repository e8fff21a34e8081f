//! SQLite PositionStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, InsertStatement, OnConflict, Order, Query};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{build_query, build_schema};
use crate::storage::schema::{create_positions_table, Positions};
use crate::storage::{Position, PositionStore, Result, StorageError};

/// SQLite implementation of PositionStore.
pub struct SqlitePositionStore {
    pool: SqlitePool,
}

impl SqlitePositionStore {
    /// Create a new SQLite position store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(&build_schema(create_positions_table()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn decode_row(row: &SqliteRow) -> Result<Position> {
        let updated_at: String = row.get("updated_at");
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| StorageError::InvalidData(format!("updated_at {updated_at}: {e}")))?
            .with_timezone(&Utc);
        let position: i64 = row.get("position");
        let sequence: i64 = row.get("sequence");

        Ok(Position {
            projection: row.get("projection"),
            instance_id: row.get("instance_id"),
            aggregate_type: row.get("aggregate_type"),
            position: position as u64,
            aggregate_id: row.get("aggregate_id"),
            sequence: sequence as u64,
            updated_at,
        })
    }

    fn select() -> sea_query::SelectStatement {
        Query::select()
            .columns([
                Positions::Projection,
                Positions::InstanceId,
                Positions::AggregateType,
                Positions::Position,
                Positions::AggregateId,
                Positions::Sequence,
                Positions::UpdatedAt,
            ])
            .from(Positions::Table)
            .to_owned()
    }
}

/// Monotonic upsert: the conflict update only fires when the incoming
/// position is ahead of the stored one.
pub(crate) fn upsert_position(position: &Position) -> InsertStatement {
    Query::insert()
        .into_table(Positions::Table)
        .columns([
            Positions::Projection,
            Positions::InstanceId,
            Positions::AggregateType,
            Positions::Position,
            Positions::AggregateId,
            Positions::Sequence,
            Positions::UpdatedAt,
        ])
        .values_panic([
            position.projection.as_str().into(),
            position.instance_id.as_str().into(),
            position.aggregate_type.as_str().into(),
            (position.position as i64).into(),
            position.aggregate_id.as_str().into(),
            (position.sequence as i64).into(),
            position.updated_at.to_rfc3339().into(),
        ])
        .on_conflict(
            OnConflict::columns([
                Positions::Projection,
                Positions::InstanceId,
                Positions::AggregateType,
            ])
            .update_columns([
                Positions::Position,
                Positions::AggregateId,
                Positions::Sequence,
                Positions::UpdatedAt,
            ])
            .action_and_where(
                Expr::col((Positions::Table, Positions::Position))
                    .lt(position.position as i64),
            )
            .to_owned(),
        )
        .to_owned()
}

#[async_trait]
impl PositionStore for SqlitePositionStore {
    async fn get(
        &self,
        projection: &str,
        instance_id: &str,
        aggregate_type: &str,
    ) -> Result<Option<Position>> {
        let query = build_query(
            Self::select()
                .and_where(Expr::col(Positions::Projection).eq(projection))
                .and_where(Expr::col(Positions::InstanceId).eq(instance_id))
                .and_where(Expr::col(Positions::AggregateType).eq(aggregate_type)),
        );

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn get_all(&self, projection: &str, instance_id: &str) -> Result<Vec<Position>> {
        let query = build_query(
            Self::select()
                .and_where(Expr::col(Positions::Projection).eq(projection))
                .and_where(Expr::col(Positions::InstanceId).eq(instance_id))
                .order_by(Positions::AggregateType, Order::Asc),
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn put(&self, position: &Position) -> Result<()> {
        let query = build_query(&upsert_position(position));
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}
