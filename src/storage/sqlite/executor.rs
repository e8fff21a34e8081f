//! SQLite StatementExecutor implementation.

use async_trait::async_trait;
use sea_query::{
    Alias, Expr, IndexCreateStatement, OnConflict, Query, SimpleExpr, TableCreateStatement,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use super::position_store::upsert_position;
use super::run_lock::renew_query;
use super::{build_query, build_schema};
use crate::projection::{Condition, Operation, Statement, StatementExecutor, Value};
use crate::storage::{LeaseFence, Position, Result, StorageError};

/// SQLite implementation of StatementExecutor.
///
/// Runs the fence check, statements and position upserts inside one
/// `BEGIN IMMEDIATE` transaction. The transaction rolls back when dropped,
/// so a caller that gives up mid-batch leaves nothing open on the pooled
/// connection.
pub struct SqliteStatementExecutor {
    pool: SqlitePool,
}

impl SqliteStatementExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn apply(
        conn: &mut SqliteConnection,
        statements: &[Statement],
        positions: &[Position],
        fence: Option<&LeaseFence>,
    ) -> Result<()> {
        if let Some(fence) = fence {
            let query = renew_query(&fence.projection, &fence.holder, fence.lease);
            let renewed = sqlx::query(&query).execute(&mut *conn).await?;
            if renewed.rows_affected() == 0 {
                return Err(StorageError::LeaseLost(fence.projection.clone()));
            }
        }

        for statement in statements {
            let Some(query) = render(statement)? else {
                continue;
            };
            sqlx::query(&query)
                .execute(&mut *conn)
                .await
                .map_err(|e| classify(e, statement))?;
        }

        for position in positions {
            let query = build_query(&upsert_position(position));
            sqlx::query(&query).execute(&mut *conn).await?;
        }
        Ok(())
    }
}

fn to_expr(value: &Value) -> Result<SimpleExpr> {
    Ok(match value {
        Value::Null => SimpleExpr::Value(sea_query::Value::String(None)),
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Text(s) => s.as_str().into(),
        Value::Timestamp(t) => t.to_rfc3339().into(),
        Value::Json(j) => serde_json::to_string(j)?.into(),
    })
}

fn condition_expr(condition: &Condition) -> Result<SimpleExpr> {
    let column = Expr::col(Alias::new(condition.column));
    Ok(match &condition.value {
        Value::Null => column.is_null(),
        value => column.eq(to_expr(value)?),
    })
}

/// Render a statement to SQL. `None` for statements with nothing to do.
fn render(statement: &Statement) -> Result<Option<String>> {
    let table = Alias::new(statement.table);
    let sql = match &statement.operation {
        Operation::NoOp => return Ok(None),
        Operation::Create { key, columns } => {
            let values = columns
                .iter()
                .map(|c| to_expr(&c.value))
                .collect::<Result<Vec<_>>>()?;
            build_query(
                Query::insert()
                    .into_table(table)
                    .columns(columns.iter().map(|c| Alias::new(c.name)))
                    .values_panic(values)
                    .on_conflict(
                        OnConflict::columns(key.iter().map(|k| Alias::new(*k)))
                            .do_nothing()
                            .to_owned(),
                    ),
            )
        }
        Operation::Update {
            columns,
            conditions,
        } => {
            if conditions.is_empty() {
                return Err(StorageError::Unscoped("update", statement.table.to_string()));
            }
            if columns.is_empty() {
                return Ok(None);
            }
            let mut update = Query::update();
            update.table(table);
            for column in columns {
                update.value(Alias::new(column.name), to_expr(&column.value)?);
            }
            for condition in conditions {
                update.and_where(condition_expr(condition)?);
            }
            build_query(&update)
        }
        Operation::Delete { conditions } => {
            if conditions.is_empty() {
                return Err(StorageError::Unscoped("delete", statement.table.to_string()));
            }
            let mut delete = Query::delete();
            delete.from_table(table);
            for condition in conditions {
                delete.and_where(condition_expr(condition)?);
            }
            build_query(&delete)
        }
    };
    Ok(Some(sql))
}

fn classify(e: sqlx::Error, statement: &Statement) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict(format!(
            "{} from {}/{} at sequence {}: {}",
            statement.table,
            statement.marker.aggregate_type,
            statement.marker.aggregate_id,
            statement.marker.sequence,
            db.message()
        )),
        _ => StorageError::Database(e),
    }
}

#[async_trait]
impl StatementExecutor for SqliteStatementExecutor {
    async fn execute(
        &self,
        statements: &[Statement],
        positions: &[Position],
        fence: Option<&LeaseFence>,
    ) -> Result<()> {
        if statements.is_empty() && positions.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        if let Err(e) = Self::apply(&mut *tx, statements, positions, fence).await {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed; the connection discards the transaction");
            }
            return Err(e);
        }

        tx.commit().await?;
        debug!(
            statements = statements.len(),
            positions = positions.len(),
            "Statements committed"
        );
        Ok(())
    }

    async fn ensure_table(
        &self,
        table: TableCreateStatement,
        indexes: Vec<IndexCreateStatement>,
    ) -> Result<()> {
        sqlx::query(&build_schema(table)).execute(&self.pool).await?;
        for index in indexes {
            sqlx::query(&build_schema(index)).execute(&self.pool).await?;
        }
        Ok(())
    }
}
