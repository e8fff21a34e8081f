//! IAM projector - event-sourced read-model engine.
//!
//! Subscribes to the identity platform's append-only event log, reduces events
//! into storage statements and keeps every projection's replay position
//! consistent across concurrently running service instances.

pub mod config;
pub mod events;
pub mod projection;
pub mod projections;
pub mod storage;
pub mod utils;
