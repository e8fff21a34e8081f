//! SQLite implementations of storage interfaces.

mod event_store;
mod executor;
mod position_store;
mod run_lock;

pub use event_store::SqliteEventStore;
pub use executor::SqliteStatementExecutor;
pub use position_store::SqlitePositionStore;
pub use run_lock::SqliteRunLock;

use sea_query::{QueryStatementWriter, SchemaStatementBuilder, SqliteQueryBuilder};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open (creating if missing) a SQLite database.
///
/// `path` may be a file path, `sqlite:`-prefixed, or `:memory:`. WAL mode
/// lets readers proceed while a projection transaction is open.
pub async fn connect_pool(path: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let path = path.trim_start_matches("sqlite:");
    let options = if path == ":memory:" {
        SqliteConnectOptions::new().in_memory(true)
    } else {
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
    };
    // A pooled in-memory database is only shared by a single connection.
    let max_connections = if path == ":memory:" { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options.busy_timeout(std::time::Duration::from_secs(5)))
        .await
}

pub(crate) fn build_schema<T: SchemaStatementBuilder>(stmt: T) -> String {
    stmt.to_string(SqliteQueryBuilder)
}

pub(crate) fn build_query<T: QueryStatementWriter>(stmt: &T) -> String {
    stmt.to_string(SqliteQueryBuilder)
}
