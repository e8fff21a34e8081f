//! Reducer registry.
//!
//! A projection declares every (aggregate type, event type) pair it consumes
//! up front. The registry resolves those bindings once, at construction, into
//! a static lookup table of reducer tags. Events outside the table are never
//! fetched; unknown or duplicate pairs are rejected before the projection
//! starts.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;

use async_trait::async_trait;

use crate::events::{Event, EventCatalog};
use crate::storage::{EventFilter, StorageError};

use super::error::ReduceError;
use super::executor::StatementExecutor;
use super::statement::Statement;

/// One (aggregate type, event type) -> reducer mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding<R> {
    pub aggregate_type: &'static str,
    pub event_type: &'static str,
    pub reducer: R,
}

impl<R> Binding<R> {
    pub fn new(aggregate_type: &'static str, event_type: &'static str, reducer: R) -> Self {
        Self {
            aggregate_type,
            event_type,
            reducer,
        }
    }
}

/// A read-model built by reducing events.
#[async_trait]
pub trait Projection: Send + Sync + 'static {
    /// Tag selecting which reduction runs for an event.
    type Reducer: Copy + Debug + Send + Sync + 'static;

    /// Unique projection name. Positions and run locks are keyed by it.
    fn name(&self) -> &str;

    fn bindings(&self) -> Vec<Binding<Self::Reducer>>;

    /// Turn one event into statements.
    ///
    /// Direct-write projections perform their own row mutation here and
    /// return [`Statement::no_op`].
    async fn reduce(
        &self,
        reducer: Self::Reducer,
        event: &Event,
    ) -> Result<Vec<Statement>, ReduceError>;

    /// Create the projection's tables. Must be idempotent.
    ///
    /// Batched projections create their tables through `executor`;
    /// direct-write projections initialize their own store.
    async fn init(&self, _executor: &dyn StatementExecutor) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Projection {0} declares no bindings")]
    Empty(String),

    #[error("Projection {projection} binds {aggregate_type}/{event_type} twice")]
    DuplicateBinding {
        projection: String,
        aggregate_type: String,
        event_type: String,
    },

    #[error("Projection {projection} binds unknown event {aggregate_type}/{event_type}")]
    UnknownEvent {
        projection: String,
        aggregate_type: String,
        event_type: String,
    },

    #[error("Projection {0} is registered twice")]
    DuplicateProjection(String),
}

/// Resolved bindings of one projection.
#[derive(Debug, Clone)]
pub struct ReducerRegistry<R> {
    projection: String,
    table: HashMap<&'static str, HashMap<&'static str, R>>,
    aggregate_types: BTreeSet<&'static str>,
    event_types: BTreeSet<&'static str>,
}

impl<R: Copy> ReducerRegistry<R> {
    pub fn new(
        projection: &str,
        bindings: Vec<Binding<R>>,
        catalog: &EventCatalog,
    ) -> Result<Self, RegistryError> {
        if bindings.is_empty() {
            return Err(RegistryError::Empty(projection.to_string()));
        }

        let mut table: HashMap<&'static str, HashMap<&'static str, R>> = HashMap::new();
        let mut aggregate_types = BTreeSet::new();
        let mut event_types = BTreeSet::new();

        for binding in bindings {
            if !catalog.contains(binding.aggregate_type, binding.event_type) {
                return Err(RegistryError::UnknownEvent {
                    projection: projection.to_string(),
                    aggregate_type: binding.aggregate_type.to_string(),
                    event_type: binding.event_type.to_string(),
                });
            }
            let by_event = table.entry(binding.aggregate_type).or_default();
            if by_event.insert(binding.event_type, binding.reducer).is_some() {
                return Err(RegistryError::DuplicateBinding {
                    projection: projection.to_string(),
                    aggregate_type: binding.aggregate_type.to_string(),
                    event_type: binding.event_type.to_string(),
                });
            }
            aggregate_types.insert(binding.aggregate_type);
            event_types.insert(binding.event_type);
        }

        Ok(Self {
            projection: projection.to_string(),
            table,
            aggregate_types,
            event_types,
        })
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    /// Reducer for this event, if the projection consumes it.
    pub fn resolve(&self, event: &Event) -> Option<R> {
        self.table
            .get(event.aggregate_type.as_str())?
            .get(event.event_type.as_str())
            .copied()
    }

    /// Aggregate types the projection watches, in stable order.
    pub fn aggregate_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.aggregate_types.iter().copied()
    }

    /// Event filter for one tenant, starting after `after_position`.
    pub fn filter(&self, instance_id: &str, after_position: u64, limit: usize) -> EventFilter {
        EventFilter {
            instance_id: instance_id.to_string(),
            aggregate_types: self.aggregate_types.iter().map(|s| s.to_string()).collect(),
            event_types: self.event_types.iter().map(|s| s.to_string()).collect(),
            after_position,
            limit,
        }
    }
}
