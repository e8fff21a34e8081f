//! Mock PositionStore implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{Position, PositionStore, Result, StorageError};

/// Key type for position store: (projection, instance_id, aggregate_type).
type PositionKey = (String, String, String);

/// Mock position store that stores positions in memory.
#[derive(Default)]
pub struct MockPositionStore {
    positions: RwLock<HashMap<PositionKey, Position>>,
    fail_on_put: RwLock<bool>,
}

impl MockPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_put(&self, fail: bool) {
        *self.fail_on_put.write().await = fail;
    }

    /// Apply positions without failure injection. Used by the mock executor
    /// while it holds its own table lock.
    pub(crate) async fn advance(&self, positions: &[Position]) {
        let mut store = self.positions.write().await;
        for position in positions {
            let key = (
                position.projection.clone(),
                position.instance_id.clone(),
                position.aggregate_type.clone(),
            );
            match store.get(&key) {
                Some(stored) if stored.position >= position.position => {}
                _ => {
                    store.insert(key, position.clone());
                }
            }
        }
    }
}

#[async_trait]
impl PositionStore for MockPositionStore {
    async fn get(
        &self,
        projection: &str,
        instance_id: &str,
        aggregate_type: &str,
    ) -> Result<Option<Position>> {
        let key = (
            projection.to_string(),
            instance_id.to_string(),
            aggregate_type.to_string(),
        );
        Ok(self.positions.read().await.get(&key).cloned())
    }

    async fn get_all(&self, projection: &str, instance_id: &str) -> Result<Vec<Position>> {
        let store = self.positions.read().await;
        let mut positions: Vec<_> = store
            .values()
            .filter(|p| p.projection == projection && p.instance_id == instance_id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.aggregate_type.cmp(&b.aggregate_type));
        Ok(positions)
    }

    async fn put(&self, position: &Position) -> Result<()> {
        if *self.fail_on_put.read().await {
            return Err(StorageError::Unavailable("mock put failure".into()));
        }
        self.advance(std::slice::from_ref(position)).await;
        Ok(())
    }
}
