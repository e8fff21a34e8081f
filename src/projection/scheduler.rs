//! Projection scheduler.
//!
//! A [`ProjectionWorker`] drives one projection through its state machine:
//!
//! ```text
//! Idle -> LockAcquiring -> Fetching -> Reducing -> Executing | Advancing -> ...
//!            |                 ^                        |
//!            v                 +------- Retrying <------+ (transient)
//!          Idle (held)                                  |
//!                                           Halted <----+ (fatal, exhausted)
//! ```
//!
//! Each cycle holds the projection's run lock, walks every tenant in the log
//! and applies batches until the tenant is caught up. Positions are only
//! advanced after the batch's statements have committed, so a crash replays
//! the batch rather than skipping it.
//!
//! The lease is renewed before every batch (and before every reduce of a
//! direct-write projection), and every commit is fenced on it. A worker that
//! lost its lease mid-batch commits nothing and defers the cycle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use backon::Retryable;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ProjectionSettings;
use crate::events::{Event, EventCatalog};
use crate::storage::{
    self, AppendNotification, LeaseFence, LockOutcome, Position, ProjectionStores,
};
use crate::utils::retry::{is_retryable, projection_backoff};

use super::error::ProjectionError;
use super::executor::ExecutorStrategy;
use super::registry::{Projection, ReducerRegistry, RegistryError};
use super::statement::Statement;

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    LockAcquiring,
    Fetching,
    Reducing,
    Executing,
    Advancing,
    Retrying,
    /// Terminal. Needs operator intervention.
    Halted,
}

/// Result of one processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The run lock is held by another instance, or was lost mid-cycle.
    Deferred,
    /// Every tenant was brought up to date; `events` were reduced.
    Completed { events: usize },
}

/// Progress of one batch.
#[derive(Debug, Clone, Copy, Default)]
struct BatchProgress {
    fetched: usize,
    applied: usize,
}

/// Drives a single projection.
pub struct ProjectionWorker<P: Projection> {
    projection: Arc<P>,
    registry: ReducerRegistry<P::Reducer>,
    settings: ProjectionSettings,
    holder: String,
    stores: ProjectionStores,
    state: watch::Sender<SchedulerState>,
}

impl<P: Projection> ProjectionWorker<P> {
    /// Resolve the projection's bindings and build a worker.
    ///
    /// Fails if the bindings are empty, duplicated or reference events the
    /// catalog does not know.
    pub fn new(
        projection: Arc<P>,
        settings: ProjectionSettings,
        stores: ProjectionStores,
        holder: impl Into<String>,
        catalog: &EventCatalog,
    ) -> Result<Self, RegistryError> {
        let registry = ReducerRegistry::new(projection.name(), projection.bindings(), catalog)?;
        let (state, _) = watch::channel(SchedulerState::Idle);
        Ok(Self {
            projection,
            registry,
            settings,
            holder: holder.into(),
            stores,
            state,
        })
    }

    pub fn name(&self) -> &str {
        self.registry.projection()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Create the projection's tables.
    pub async fn init(&self) -> Result<(), storage::StorageError> {
        self.projection.init(self.stores.executor.as_ref()).await
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }

    /// Run one catch-up cycle across every tenant.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, ProjectionError> {
        self.cycle(None).await
    }

    /// Run cycles until `shutdown` flips to `true` or the projection halts.
    ///
    /// Between cycles the worker waits for the poll interval, an append
    /// notification or shutdown, whichever comes first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ProjectionError> {
        let mut notifications = self.stores.events.subscribe();
        info!(projection = %self.name(), holder = %self.holder, "Projection worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.cycle(Some(&shutdown)).await {
                Ok(CycleOutcome::Completed { events }) if events > 0 => {
                    debug!(projection = %self.name(), events, "Projection cycle completed");
                }
                Ok(_) => {}
                Err(e) => {
                    self.set_state(SchedulerState::Halted);
                    error!(
                        projection = %self.name(),
                        diagnostic = e.diagnostic(),
                        error = %e,
                        "Projection halted"
                    );
                    return Err(e);
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = wait_for_append(&mut notifications) => {}
            }
        }

        self.set_state(SchedulerState::Idle);
        info!(projection = %self.name(), "Projection worker stopped");
        Ok(())
    }

    async fn cycle(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleOutcome, ProjectionError> {
        let span = info_span!("projection.cycle", projection = %self.name());
        async {
            self.set_state(SchedulerState::LockAcquiring);
            let outcome = self
                .retrying(|| {
                    self.bounded(self.stores.locks.try_acquire(
                        self.name(),
                        &self.holder,
                        self.settings.lock_lease,
                    ))
                })
                .await;

            match outcome {
                Ok(LockOutcome::Acquired { .. }) => {}
                Ok(LockOutcome::Held { holder, expires_at }) => {
                    debug!(%holder, %expires_at, "Run lock held elsewhere, deferring");
                    self.set_state(SchedulerState::Idle);
                    return Ok(CycleOutcome::Deferred);
                }
                Err(e) => return Err(e),
            }

            let result = self.process_tenants(shutdown).await;

            if let Err(e) = self
                .bounded(self.stores.locks.release(self.name(), &self.holder))
                .await
            {
                warn!(error = %e, "Failed to release run lock; it expires with its lease");
            }

            match result {
                Ok(events) => {
                    self.set_state(SchedulerState::Idle);
                    Ok(CycleOutcome::Completed { events })
                }
                Err(e) if e.is_deferral() => {
                    warn!(error = %e, "Run lock lost mid-cycle, deferring");
                    self.set_state(SchedulerState::Idle);
                    Ok(CycleOutcome::Deferred)
                }
                Err(e) => Err(e),
            }
        }
        .instrument(span)
        .await
    }

    async fn process_tenants(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<usize, ProjectionError> {
        self.set_state(SchedulerState::Fetching);
        let instances = self
            .retrying(|| self.bounded(self.stores.events.instances()))
            .await?;

        let mut applied = 0;
        for instance_id in instances {
            loop {
                if shutdown.is_some_and(|s| *s.borrow()) {
                    return Ok(applied);
                }

                let progress = self.retrying(|| self.process_batch(&instance_id)).await?;
                applied += progress.applied;
                if progress.fetched < self.settings.batch_size {
                    break;
                }
            }
        }
        Ok(applied)
    }

    /// Fetch, reduce and commit one batch for one tenant.
    ///
    /// Safe to re-run from scratch: the lease is renewed and positions are
    /// re-read on every attempt, and nothing is advanced until the batch's
    /// statements are committed.
    async fn process_batch(&self, instance_id: &str) -> Result<BatchProgress, ProjectionError> {
        self.renew_lease().await?;
        self.set_state(SchedulerState::Fetching);
        let stored = self
            .bounded(self.stores.positions.get_all(self.name(), instance_id))
            .await?;

        let mut positions: HashMap<&str, Position> = self
            .registry
            .aggregate_types()
            .map(|t| (t, Position::initial(self.name(), instance_id, t)))
            .collect();
        for position in stored {
            if let Some(slot) = positions.get_mut(position.aggregate_type.as_str()) {
                *slot = position;
            }
        }

        let from = positions.values().map(|p| p.position).min().unwrap_or(0);
        let filter = self
            .registry
            .filter(instance_id, from, self.settings.batch_size);
        let events = self.bounded(self.stores.events.query(&filter)).await?;

        let Some(last) = events.last().map(|e| e.position) else {
            return Ok(BatchProgress::default());
        };

        self.set_state(SchedulerState::Reducing);
        let mut statements = Vec::new();
        let mut applied = 0;
        for event in &events {
            let covered = positions
                .get(event.aggregate_type.as_str())
                .is_some_and(|p| event.position <= p.position);
            if covered {
                continue;
            }
            let Some(reducer) = self.registry.resolve(event) else {
                continue;
            };

            // Direct-write reducers touch rows themselves, outside any fence.
            // A fresh lease outlives one bounded reduce.
            if self.settings.strategy == ExecutorStrategy::DirectWrite {
                self.renew_lease().await?;
                self.set_state(SchedulerState::Reducing);
            }
            let reduced = self.reduce(reducer, event).await?;
            applied += 1;

            match self.settings.strategy {
                ExecutorStrategy::Batched => {
                    statements.extend(reduced.into_iter().filter(|s| !s.is_no_op()));
                    if let Some(slot) = positions.get_mut(event.aggregate_type.as_str()) {
                        *slot = Position::after(self.name(), event);
                    }
                }
                ExecutorStrategy::DirectWrite => {
                    self.advance_direct(event, reduced).await?;
                    self.set_state(SchedulerState::Reducing);
                }
            }
        }

        // Every watched type has now seen all events up to `last`, including
        // types that had nothing in this batch.
        let advanced: Vec<Position> = positions
            .into_values()
            .map(|mut p| {
                p.position = last;
                p.updated_at = chrono::Utc::now();
                p
            })
            .collect();

        let fence = self.fence();
        match self.settings.strategy {
            ExecutorStrategy::Batched => {
                self.set_state(SchedulerState::Executing);
                self.bounded(
                    self.stores
                        .executor
                        .execute(&statements, &advanced, Some(&fence)),
                )
                .await?;
            }
            ExecutorStrategy::DirectWrite => {
                self.set_state(SchedulerState::Advancing);
                self.bounded(self.stores.executor.execute(&[], &advanced, Some(&fence)))
                    .await?;
            }
        }

        debug!(
            instance_id,
            fetched = events.len(),
            applied,
            position = last,
            "Batch committed"
        );
        Ok(BatchProgress {
            fetched: events.len(),
            applied,
        })
    }

    async fn reduce(
        &self,
        reducer: P::Reducer,
        event: &Event,
    ) -> Result<Vec<Statement>, ProjectionError> {
        let reduced =
            tokio::time::timeout(self.settings.store_timeout, self.projection.reduce(reducer, event))
                .await
                .map_err(|_| ProjectionError::Timeout(self.settings.store_timeout))?;

        reduced.map_err(|source| {
            if !source.kind().is_retryable() {
                error!(
                    instance_id = %event.instance_id,
                    aggregate_type = %event.aggregate_type,
                    aggregate_id = %event.aggregate_id,
                    sequence = event.sequence,
                    event_type = %event.event_type,
                    diagnostic = source.diagnostic(),
                    error = %source,
                    "Reduce failed"
                );
            }
            ProjectionError::Reduce {
                aggregate_type: event.aggregate_type.clone(),
                aggregate_id: event.aggregate_id.clone(),
                event_type: event.event_type.clone(),
                sequence: event.sequence,
                source,
            }
        })
    }

    /// Per-event advance for direct-write projections.
    async fn advance_direct(
        &self,
        event: &Event,
        reduced: Vec<Statement>,
    ) -> Result<(), ProjectionError> {
        self.set_state(SchedulerState::Advancing);
        let position = Position::after(self.name(), event);
        let pending: Vec<Statement> = reduced.into_iter().filter(|s| s.in_position_tx).collect();

        self.bounded(self.stores.executor.execute(
            &pending,
            std::slice::from_ref(&position),
            Some(&self.fence()),
        ))
        .await
    }

    fn fence(&self) -> LeaseFence {
        LeaseFence::new(self.name(), &self.holder, self.settings.lock_lease)
    }

    /// Extend the run lock, or fail with `LockLost` if it is gone.
    async fn renew_lease(&self) -> Result<(), ProjectionError> {
        let renewed = self
            .bounded(self.stores.locks.renew(
                self.name(),
                &self.holder,
                self.settings.lock_lease,
            ))
            .await?;
        if renewed {
            Ok(())
        } else {
            Err(ProjectionError::LockLost(self.name().to_string()))
        }
    }

    /// Bound a store call by the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = storage::Result<T>>,
    ) -> Result<T, ProjectionError> {
        match tokio::time::timeout(self.settings.store_timeout, call).await {
            Ok(result) => result.map_err(ProjectionError::from),
            Err(_) => Err(ProjectionError::Timeout(self.settings.store_timeout)),
        }
    }

    /// Retry transient failures with the projection's backoff.
    async fn retrying<T, F, Fut>(&self, op: F) -> Result<T, ProjectionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProjectionError>>,
    {
        op.retry(projection_backoff(&self.settings.retry))
            .when(is_retryable)
            .notify(|e, delay| {
                self.set_state(SchedulerState::Retrying);
                warn!(
                    projection = %self.name(),
                    diagnostic = e.diagnostic(),
                    error = %e,
                    ?delay,
                    "Transient failure, retrying"
                );
            })
            .await
    }
}

async fn wait_for_append(rx: &mut Option<broadcast::Receiver<AppendNotification>>) {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    let closed = matches!(
        receiver.recv().await,
        Err(broadcast::error::RecvError::Closed)
    );
    if closed {
        *rx = None;
    }
}
