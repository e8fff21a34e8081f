//! EventStore trait definition.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::Result;
use crate::events::{Event, NewEvent};

/// Selects the events a projection consumes for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub instance_id: String,
    pub aggregate_types: Vec<String>,
    pub event_types: Vec<String>,
    /// Only events with a log position strictly greater than this.
    pub after_position: u64,
    pub limit: usize,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        event.instance_id == self.instance_id
            && event.position > self.after_position
            && self.aggregate_types.iter().any(|t| *t == event.aggregate_type)
            && self.event_types.iter().any(|t| *t == event.event_type)
    }
}

/// Push signal sent after a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendNotification {
    pub instance_id: String,
    pub position: u64,
}

/// Interface to the append-only event log.
///
/// The projection engine only reads; `append` is used by command handlers
/// and tests.
///
/// # Implementations
///
/// - `SqliteEventStore`: SQLite storage
/// - `MockEventStore`: In-memory mock for testing
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events, assigning per-aggregate sequences and log positions.
    ///
    /// Returns the committed events in append order.
    async fn append(&self, events: Vec<NewEvent>) -> Result<Vec<Event>>;

    /// Read events matching the filter, ordered by log position ascending.
    ///
    /// Position order implies per-aggregate sequence order.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>>;

    /// List every tenant that has events in the log.
    async fn instances(&self) -> Result<Vec<String>>;

    /// Subscribe to append notifications, if the store can push them.
    fn subscribe(&self) -> Option<broadcast::Receiver<AppendNotification>> {
        None
    }
}
