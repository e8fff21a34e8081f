//! Projection engine.
//!
//! A projection declares its bindings ([`registry`]), reduces events into
//! [`Statement`]s, and is driven by a [`ProjectionWorker`] that fetches
//! events after the stored position, executes the statements atomically with
//! the position advance and retries transient failures. The
//! [`ProjectionEngine`] runs many workers in parallel.

pub mod engine;
pub mod error;
pub mod executor;
pub mod registry;
pub mod scheduler;
pub mod statement;

pub use engine::{EngineHandle, ProjectionEngine};
pub use error::{ErrorKind, ProjectionError, ReduceError};
pub use executor::{ExecutorStrategy, StatementExecutor};
pub use registry::{Binding, Projection, ReducerRegistry, RegistryError};
pub use scheduler::{CycleOutcome, ProjectionWorker, SchedulerState};
pub use statement::{Column, Condition, EventMarker, Operation, Statement, Value};
