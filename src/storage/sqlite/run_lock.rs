//! SQLite RunLock implementation.
//!
//! A single upsert performs the compare-and-swap: the conflict update only
//! fires when the stored lease has expired or already belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_query::{Expr, OnConflict, Query};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{build_query, build_schema};
use crate::storage::run_lock::lease_expiry;
use crate::storage::schema::{create_locks_table, ProjectionLocks};
use crate::storage::{LockOutcome, Result, RunLock, StorageError};

/// SQLite implementation of RunLock.
pub struct SqliteRunLock {
    pool: SqlitePool,
}

impl SqliteRunLock {
    /// Create a new SQLite run lock.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(&build_schema(create_locks_table()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StorageError::InvalidData(format!("lease expiry {millis}")))
}

/// Extend `holder`'s lease if it is still current. Touches no row otherwise.
pub(super) fn renew_query(projection: &str, holder: &str, lease: Duration) -> String {
    build_query(
        Query::update()
            .table(ProjectionLocks::Table)
            .value(
                ProjectionLocks::ExpiresAt,
                lease_expiry(lease).timestamp_millis(),
            )
            .and_where(Expr::col(ProjectionLocks::Projection).eq(projection))
            .and_where(Expr::col(ProjectionLocks::Holder).eq(holder))
            .and_where(Expr::col(ProjectionLocks::ExpiresAt).gt(Utc::now().timestamp_millis())),
    )
}

#[async_trait]
impl RunLock for SqliteRunLock {
    async fn try_acquire(
        &self,
        projection: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<LockOutcome> {
        let now = Utc::now().timestamp_millis();
        let expires_at = lease_expiry(lease);

        let query = build_query(
            Query::insert()
                .into_table(ProjectionLocks::Table)
                .columns([
                    ProjectionLocks::Projection,
                    ProjectionLocks::Holder,
                    ProjectionLocks::ExpiresAt,
                ])
                .values_panic([
                    projection.into(),
                    holder.into(),
                    expires_at.timestamp_millis().into(),
                ])
                .on_conflict(
                    OnConflict::column(ProjectionLocks::Projection)
                        .update_columns([ProjectionLocks::Holder, ProjectionLocks::ExpiresAt])
                        .action_and_where(
                            Expr::col((ProjectionLocks::Table, ProjectionLocks::ExpiresAt))
                                .lte(now)
                                .or(Expr::col((ProjectionLocks::Table, ProjectionLocks::Holder))
                                    .eq(holder)),
                        )
                        .to_owned(),
                ),
        );

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            debug!(projection, holder, "Run lock acquired");
            return Ok(LockOutcome::Acquired { expires_at });
        }

        let query = build_query(
            Query::select()
                .columns([ProjectionLocks::Holder, ProjectionLocks::ExpiresAt])
                .from(ProjectionLocks::Table)
                .and_where(Expr::col(ProjectionLocks::Projection).eq(projection)),
        );
        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await?
            // Released between the upsert and the read; the caller retries.
            .ok_or_else(|| {
                StorageError::Unavailable(format!("run lock {projection} changed during acquire"))
            })?;

        Ok(LockOutcome::Held {
            holder: row.get("holder"),
            expires_at: from_millis(row.get("expires_at"))?,
        })
    }

    async fn renew(&self, projection: &str, holder: &str, lease: Duration) -> Result<bool> {
        let result = sqlx::query(&renew_query(projection, holder, lease))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, projection: &str, holder: &str) -> Result<()> {
        let query = build_query(
            Query::delete()
                .from_table(ProjectionLocks::Table)
                .and_where(Expr::col(ProjectionLocks::Projection).eq(projection))
                .and_where(Expr::col(ProjectionLocks::Holder).eq(holder)),
        );

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}
