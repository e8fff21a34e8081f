//! Mock StatementExecutor implementation for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_query::{IndexCreateStatement, TableCreateStatement};
use tokio::sync::RwLock;

use super::{MockPositionStore, MockRunLock};
use crate::projection::{Condition, Operation, Statement, StatementExecutor, Value};
use crate::storage::{LeaseFence, Position, Result, RunLock, StorageError};

/// One in-memory row, keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Mock executor holding projection tables in memory.
///
/// Statements are applied to a copy of the tables which replaces the
/// original only if every statement succeeded. Fences are checked against
/// the shared [`MockRunLock`] while the tables are write-locked.
pub struct MockStatementExecutor {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    positions: Arc<MockPositionStore>,
    locks: Arc<MockRunLock>,
    fail_next: RwLock<usize>,
    stall_next: RwLock<(usize, Duration)>,
    executions: RwLock<usize>,
}

impl MockStatementExecutor {
    pub fn new(positions: Arc<MockPositionStore>, locks: Arc<MockRunLock>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            positions,
            locks,
            fail_next: RwLock::new(0),
            stall_next: RwLock::new((0, Duration::ZERO)),
            executions: RwLock::new(0),
        }
    }

    /// Fail the next `n` executions with a transient error.
    pub async fn fail_next(&self, n: usize) {
        *self.fail_next.write().await = n;
    }

    /// Delay the next `n` executions by `delay` before they touch anything.
    pub async fn stall_next(&self, n: usize, delay: Duration) {
        *self.stall_next.write().await = (n, delay);
    }

    /// Successful executions so far.
    pub async fn executions(&self) -> usize {
        *self.executions.read().await
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn matches(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| match (&c.value, row.get(c.column)) {
        (Value::Null, None) => true,
        (value, Some(stored)) => value == stored,
        _ => false,
    })
}

fn apply(tables: &mut HashMap<String, Vec<Row>>, statement: &Statement) -> Result<()> {
    match &statement.operation {
        Operation::NoOp => {}
        Operation::Create { key, columns } => {
            let row: Row = columns
                .iter()
                .map(|c| (c.name.to_string(), c.value.clone()))
                .collect();
            let table = tables.entry(statement.table.to_string()).or_default();
            let exists = table
                .iter()
                .any(|existing| key.iter().all(|k| existing.get(*k) == row.get(*k)));
            if !exists {
                table.push(row);
            }
        }
        Operation::Update {
            columns,
            conditions,
        } => {
            if conditions.is_empty() {
                return Err(StorageError::Unscoped("update", statement.table.to_string()));
            }
            if let Some(table) = tables.get_mut(statement.table) {
                for row in table.iter_mut().filter(|r| matches(r, conditions)) {
                    for column in columns {
                        row.insert(column.name.to_string(), column.value.clone());
                    }
                }
            }
        }
        Operation::Delete { conditions } => {
            if conditions.is_empty() {
                return Err(StorageError::Unscoped("delete", statement.table.to_string()));
            }
            if let Some(table) = tables.get_mut(statement.table) {
                table.retain(|r| !matches(r, conditions));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl StatementExecutor for MockStatementExecutor {
    async fn execute(
        &self,
        statements: &[Statement],
        positions: &[Position],
        fence: Option<&LeaseFence>,
    ) -> Result<()> {
        {
            let mut fail_next = self.fail_next.write().await;
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(StorageError::Unavailable("mock execute failure".into()));
            }
        }

        let stall = {
            let mut stall_next = self.stall_next.write().await;
            if stall_next.0 > 0 {
                stall_next.0 -= 1;
                Some(stall_next.1)
            } else {
                None
            }
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let mut tables = self.tables.write().await;
        if let Some(fence) = fence {
            if !self
                .locks
                .renew(&fence.projection, &fence.holder, fence.lease)
                .await?
            {
                return Err(StorageError::LeaseLost(fence.projection.clone()));
            }
        }

        let mut staged = tables.clone();
        for statement in statements {
            apply(&mut staged, statement)?;
        }
        self.positions.advance(positions).await;
        *tables = staged;
        *self.executions.write().await += 1;
        Ok(())
    }

    async fn ensure_table(
        &self,
        _table: TableCreateStatement,
        _indexes: Vec<IndexCreateStatement>,
    ) -> Result<()> {
        Ok(())
    }
}
