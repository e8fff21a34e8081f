//! Storage interfaces and implementations.
//!
//! The projection engine consumes four collaborators:
//! - [`EventStore`]: the append-only event log
//! - [`PositionStore`]: per projection/tenant/aggregate-type high-water marks
//! - [`RunLock`]: lease-based mutual exclusion per projection
//! - [`StatementExecutor`]: atomic apply of statements plus position advance
//!
//! `sqlite` is the shipped backend; `mock` holds in-memory doubles used by
//! tests.

use std::sync::Arc;

use crate::projection::{ErrorKind, StatementExecutor};

pub mod event_store;
pub mod mock;
pub mod position_store;
pub mod run_lock;
pub mod schema;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use event_store::{AppendNotification, EventFilter, EventStore};
pub use position_store::{Position, PositionStore};
pub use run_lock::{LeaseFence, LockOutcome, RunLock};

#[cfg(feature = "sqlite")]
pub use sqlite::{
    SqliteEventStore, SqlitePositionStore, SqliteRunLock, SqliteStatementExecutor,
};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Unscoped {0} on table {1}: refusing to touch every row")]
    Unscoped(&'static str, String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Run lock lease for projection {0} is no longer held")]
    LeaseLost(String),
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            StorageError::Database(e) => is_transient_sqlx(e),
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::LeaseLost(_) => ErrorKind::LockUnavailable,
            StorageError::Conflict(_) => ErrorKind::Conflict,
            StorageError::Serialization(_) | StorageError::InvalidData(_) => ErrorKind::Decode,
            e if e.is_transient() => ErrorKind::TransientStore,
            _ => ErrorKind::Conflict,
        }
    }
}

fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => {
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
            let busy_code = db
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| matches!(c & 0xff, 5 | 6))
                .unwrap_or(false);
            busy_code || db.message().contains("database is locked")
        }
        _ => false,
    }
}

/// The storage collaborators a projection worker needs.
#[derive(Clone)]
pub struct ProjectionStores {
    pub events: Arc<dyn EventStore>,
    pub positions: Arc<dyn PositionStore>,
    pub locks: Arc<dyn RunLock>,
    pub executor: Arc<dyn StatementExecutor>,
}

/// Initialized SQLite storage: the engine's stores plus the shared pool that
/// projections use for their own tables.
#[cfg(feature = "sqlite")]
pub struct SqliteStorage {
    pub pool: sqlx::SqlitePool,
    pub stores: ProjectionStores,
}

/// Initialize storage based on configuration.
#[cfg(feature = "sqlite")]
pub async fn init_storage(
    config: &crate::config::StorageConfig,
) -> std::result::Result<SqliteStorage, Box<dyn std::error::Error + Send + Sync>> {
    use tracing::{error, info};

    use crate::config::StorageType;

    info!("Storage: {:?} at {}", config.storage_type, config.path);

    match config.storage_type {
        StorageType::Sqlite => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let pool = sqlite::connect_pool(&config.path, config.max_connections).await?;

            let events = Arc::new(SqliteEventStore::new(pool.clone()));
            events.init().await?;

            let positions = Arc::new(SqlitePositionStore::new(pool.clone()));
            positions.init().await?;

            let locks = Arc::new(SqliteRunLock::new(pool.clone()));
            locks.init().await?;

            let executor = Arc::new(SqliteStatementExecutor::new(pool.clone()));

            Ok(SqliteStorage {
                pool,
                stores: ProjectionStores {
                    events,
                    positions,
                    locks,
                    executor,
                },
            })
        }
        StorageType::Memory => {
            error!("Memory storage is only available to tests via storage::mock");
            Err("memory storage cannot back the projector binary".into())
        }
    }
}
