//! Mock storage implementations for testing.

mod event_store;
mod executor;
mod position_store;
mod run_lock;

pub use event_store::MockEventStore;
pub use executor::{MockStatementExecutor, Row};
pub use position_store::MockPositionStore;
pub use run_lock::MockRunLock;

use std::sync::Arc;

use super::ProjectionStores;

/// In-memory doubles wired together: the executor advances positions in the
/// same position store the scheduler reads and fences on the same run lock.
#[derive(Clone)]
pub struct MockStorage {
    pub events: Arc<MockEventStore>,
    pub positions: Arc<MockPositionStore>,
    pub locks: Arc<MockRunLock>,
    pub executor: Arc<MockStatementExecutor>,
}

impl MockStorage {
    pub fn new() -> Self {
        let positions = Arc::new(MockPositionStore::new());
        let locks = Arc::new(MockRunLock::new());
        Self {
            events: Arc::new(MockEventStore::new()),
            executor: Arc::new(MockStatementExecutor::new(positions.clone(), locks.clone())),
            locks,
            positions,
        }
    }

    pub fn stores(&self) -> ProjectionStores {
        ProjectionStores {
            events: self.events.clone(),
            positions: self.positions.clone(),
            locks: self.locks.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}
