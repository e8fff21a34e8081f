//! Projection engine: runs every registered projection on its own task.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ProjectionSettings;
use crate::events::EventCatalog;
use crate::storage::{ProjectionStores, StorageError};

use super::error::ProjectionError;
use super::registry::{Projection, RegistryError};
use super::scheduler::{ProjectionWorker, SchedulerState};

type WorkerRun = Box<dyn FnOnce(watch::Receiver<bool>) -> BoxFuture<'static, Result<(), ProjectionError>> + Send>;

struct Registered {
    name: String,
    state: watch::Receiver<SchedulerState>,
    run: WorkerRun,
}

/// Collects projections and starts their workers.
pub struct ProjectionEngine {
    stores: ProjectionStores,
    catalog: EventCatalog,
    holder: String,
    registered: Vec<Registered>,
}

impl ProjectionEngine {
    pub fn new(stores: ProjectionStores, catalog: EventCatalog, holder: impl Into<String>) -> Self {
        Self {
            stores,
            catalog,
            holder: holder.into(),
            registered: Vec::new(),
        }
    }

    /// Validate a projection's bindings, create its tables and queue its
    /// worker.
    pub async fn register_projection<P: Projection>(
        &mut self,
        projection: P,
        settings: ProjectionSettings,
    ) -> Result<(), ProjectionError> {
        let name = projection.name().to_string();
        if self.registered.iter().any(|r| r.name == name) {
            return Err(RegistryError::DuplicateProjection(name).into());
        }

        let worker = ProjectionWorker::new(
            Arc::new(projection),
            settings,
            self.stores.clone(),
            self.holder.clone(),
            &self.catalog,
        )?;
        worker.init().await.map_err(|e: StorageError| {
            error!(projection = %name, error = %e, "Failed to initialize projection tables");
            e
        })?;

        info!(projection = %name, "Projection registered");
        self.registered.push(Registered {
            name,
            state: worker.subscribe_state(),
            run: Box::new(move |shutdown| Box::pin(worker.run(shutdown))),
        });
        Ok(())
    }

    pub fn projections(&self) -> impl Iterator<Item = &str> {
        self.registered.iter().map(|r| r.name.as_str())
    }

    /// Spawn one task per projection.
    pub fn start(self) -> EngineHandle {
        let (shutdown, rx) = watch::channel(false);
        let mut states = HashMap::new();
        let mut tasks = Vec::new();

        for registered in self.registered {
            states.insert(registered.name.clone(), registered.state);
            let task = tokio::spawn((registered.run)(rx.clone()));
            tasks.push((registered.name, task));
        }

        info!(projections = tasks.len(), "Projection engine started");
        EngineHandle {
            shutdown,
            states,
            tasks,
        }
    }
}

/// Handle to a running engine.
pub struct EngineHandle {
    shutdown: watch::Sender<bool>,
    states: HashMap<String, watch::Receiver<SchedulerState>>,
    tasks: Vec<(String, JoinHandle<Result<(), ProjectionError>>)>,
}

impl EngineHandle {
    /// Current state of a projection's worker.
    pub fn state(&self, projection: &str) -> Option<SchedulerState> {
        self.states.get(projection).map(|rx| *rx.borrow())
    }

    /// Snapshot of every worker's state.
    pub fn states(&self) -> HashMap<String, SchedulerState> {
        self.states
            .iter()
            .map(|(name, rx)| (name.clone(), *rx.borrow()))
            .collect()
    }

    /// Watch one projection's state transitions.
    pub fn watch(&self, projection: &str) -> Option<watch::Receiver<SchedulerState>> {
        self.states.get(projection).cloned()
    }

    /// Signal every worker to stop after its current batch, then wait for
    /// them.
    pub async fn shutdown(self) -> HashMap<String, Result<(), ProjectionError>> {
        self.shutdown.send_replace(true);
        self.join().await
    }

    /// Wait for every worker to exit. Workers only exit on their own when
    /// they halt.
    pub async fn join(self) -> HashMap<String, Result<(), ProjectionError>> {
        let mut results = HashMap::new();
        for (name, task) in self.tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(projection = %name, error = %e, "Projection task panicked");
                    Err(ProjectionError::Storage(StorageError::Unavailable(format!(
                        "worker task failed: {e}"
                    ))))
                }
            };
            results.insert(name, result);
        }
        results
    }
}
