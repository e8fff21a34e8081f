//! Statement executor interface.

use async_trait::async_trait;
use sea_query::{IndexCreateStatement, TableCreateStatement};
use serde::Deserialize;

use super::statement::Statement;
use crate::storage::{LeaseFence, Position, Result};

/// How a projection's reductions reach storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorStrategy {
    /// Statements of a fetched batch and the position advance commit in one
    /// transaction. A failure rolls everything back and the batch is retried
    /// from the same starting position.
    #[default]
    Batched,
    /// The reducer already wrote its rows. Only the position advances, once
    /// per event.
    DirectWrite,
}

/// Applies statements and the new positions as one atomic unit.
///
/// Statements must be safe to re-execute: Create is insert-or-ignore on the
/// natural key, Update and Delete are condition-scoped.
///
/// With a `fence`, the lease is checked and extended inside the same
/// transaction. If the holder no longer owns an unexpired lease nothing is
/// applied and the call fails with `StorageError::LeaseLost`.
///
/// # Implementations
///
/// - `SqliteStatementExecutor`: SQLite storage
/// - `MockStatementExecutor`: In-memory mock for testing
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(
        &self,
        statements: &[Statement],
        positions: &[Position],
        fence: Option<&LeaseFence>,
    ) -> Result<()>;

    /// Create a projection table and its indexes if they do not exist.
    async fn ensure_table(
        &self,
        table: TableCreateStatement,
        indexes: Vec<IndexCreateStatement>,
    ) -> Result<()>;
}
