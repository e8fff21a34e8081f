//! PositionStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::events::Event;

/// Last applied event for one projection, tenant and aggregate type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub projection: String,
    pub instance_id: String,
    pub aggregate_type: String,
    /// Log position of the last applied event.
    pub position: u64,
    /// Aggregate and sequence of the last applied event of this type.
    pub aggregate_id: String,
    pub sequence: u64,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Position just past `event`.
    pub fn after(projection: &str, event: &Event) -> Self {
        Self {
            projection: projection.to_string(),
            instance_id: event.instance_id.clone(),
            aggregate_type: event.aggregate_type.clone(),
            position: event.position,
            aggregate_id: event.aggregate_id.clone(),
            sequence: event.sequence,
            updated_at: Utc::now(),
        }
    }

    /// Empty starting position.
    pub fn initial(projection: &str, instance_id: &str, aggregate_type: &str) -> Self {
        Self {
            projection: projection.to_string(),
            instance_id: instance_id.to_string(),
            aggregate_type: aggregate_type.to_string(),
            position: 0,
            aggregate_id: String::new(),
            sequence: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Interface for position tracking.
///
/// Positions are keyed by `(projection, instance_id, aggregate_type)` and are
/// only ever written by the statement executor or the direct-write advance
/// path. Reducers never see them.
///
/// # Implementations
///
/// - `SqlitePositionStore`: SQLite storage
/// - `MockPositionStore`: In-memory mock for testing
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Get the position for one aggregate type. `None` if never advanced.
    async fn get(
        &self,
        projection: &str,
        instance_id: &str,
        aggregate_type: &str,
    ) -> Result<Option<Position>>;

    /// Get every recorded position of a projection for one tenant.
    async fn get_all(&self, projection: &str, instance_id: &str) -> Result<Vec<Position>>;

    /// Store a position.
    ///
    /// Upserts, but never moves a stored position backwards.
    async fn put(&self, position: &Position) -> Result<()>;
}
