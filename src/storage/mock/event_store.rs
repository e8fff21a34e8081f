//! Mock EventStore implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::events::{Event, NewEvent};
use crate::storage::{AppendNotification, EventFilter, EventStore, Result, StorageError};

/// Mock event store that stores events in memory.
pub struct MockEventStore {
    events: RwLock<Vec<Event>>,
    notifier: broadcast::Sender<AppendNotification>,
    fail_on_query: RwLock<bool>,
}

impl MockEventStore {
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(256);
        Self {
            events: RwLock::new(Vec::new()),
            notifier,
            fail_on_query: RwLock::new(false),
        }
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

impl Default for MockEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn append(&self, events: Vec<NewEvent>) -> Result<Vec<Event>> {
        let mut store = self.events.write().await;
        let mut sequences: HashMap<(String, String, String), u64> = HashMap::new();
        let mut committed = Vec::with_capacity(events.len());

        for new in events {
            let key = (
                new.instance_id.clone(),
                new.aggregate_type.clone(),
                new.aggregate_id.clone(),
            );
            let last = match sequences.get(&key) {
                Some(last) => *last,
                None => store
                    .iter()
                    .filter(|e| {
                        e.instance_id == key.0 && e.aggregate_type == key.1 && e.aggregate_id == key.2
                    })
                    .map(|e| e.sequence)
                    .max()
                    .unwrap_or(0),
            };
            sequences.insert(key, last + 1);

            let event = Event {
                instance_id: new.instance_id,
                aggregate_type: new.aggregate_type,
                aggregate_id: new.aggregate_id,
                resource_owner: new.resource_owner,
                sequence: last + 1,
                position: (store.len() + 1) as u64,
                event_type: new.event_type,
                created_at: new.created_at.unwrap_or_else(Utc::now),
                payload: new.payload,
            };
            store.push(event.clone());
            committed.push(event);
        }
        drop(store);

        for event in &committed {
            let _ = self.notifier.send(AppendNotification {
                instance_id: event.instance_id.clone(),
                position: event.position,
            });
        }
        Ok(committed)
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        if *self.fail_on_query.read().await {
            return Err(StorageError::Unavailable("mock query failure".into()));
        }
        let store = self.events.read().await;
        Ok(store
            .iter()
            .filter(|e| filter.matches(e))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn instances(&self) -> Result<Vec<String>> {
        let store = self.events.read().await;
        let mut instances: Vec<_> = store.iter().map(|e| e.instance_id.clone()).collect();
        instances.sort();
        instances.dedup();
        Ok(instances)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AppendNotification>> {
        Some(self.notifier.subscribe())
    }
}
