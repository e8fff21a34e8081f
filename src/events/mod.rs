//! Event and aggregate model.
//!
//! An [`Event`] is an immutable fact appended to one aggregate's timeline.
//! `sequence` increases strictly per (instance, aggregate); `position` is the
//! global log offset assigned at append and increases across the whole log.
//!
//! The submodules declare the event types each aggregate emits, together with
//! their payload shapes. [`EventCatalog::iam`] collects them so projections can
//! be validated at startup.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::projection::ReduceError;

pub mod flow;
pub mod instance;
pub mod org;
pub mod policy;
pub mod user;

/// Identity of one aggregate timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateRef {
    pub instance_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
}

/// A committed event as read back from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub instance_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    /// Organisation owning the aggregate.
    pub resource_owner: String,
    pub sequence: u64,
    pub position: u64,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn aggregate(&self) -> AggregateRef {
        AggregateRef {
            instance_id: self.instance_id.clone(),
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
        }
    }

    /// Deserialize the payload into its typed shape.
    ///
    /// `diagnostic` identifies the call site in logs; a malformed payload is
    /// always a decode error, never silently skipped.
    pub fn decode<T: DeserializeOwned>(&self, diagnostic: &'static str) -> Result<T, ReduceError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            ReduceError::decode(
                diagnostic,
                format!(
                    "could not unmarshal {} payload at sequence {}: {}",
                    self.event_type, self.sequence, e
                ),
            )
        })
    }
}

/// An event about to be appended. The log assigns `sequence` and `position`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub instance_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub resource_owner: String,
    pub event_type: String,
    pub created_at: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
}

impl NewEvent {
    pub fn new(
        instance_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        let aggregate_id = aggregate_id.into();
        Self {
            instance_id: instance_id.into(),
            aggregate_type: aggregate_type.into(),
            resource_owner: aggregate_id.clone(),
            aggregate_id,
            event_type: event_type.into(),
            created_at: None,
            payload: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn owned_by(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = resource_owner.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Set of (aggregate type, event type) pairs the platform emits.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    known: HashSet<(String, String)>,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue of every event type declared in this crate.
    pub fn iam() -> Self {
        let mut catalog = Self::new();
        catalog.register(user::AGGREGATE_TYPE, user::EVENT_TYPES);
        catalog.register(org::AGGREGATE_TYPE, org::EVENT_TYPES);
        catalog.register(instance::AGGREGATE_TYPE, instance::EVENT_TYPES);
        catalog.register(org::AGGREGATE_TYPE, policy::ORG_EVENT_TYPES);
        catalog.register(instance::AGGREGATE_TYPE, policy::INSTANCE_EVENT_TYPES);
        catalog.register(org::AGGREGATE_TYPE, flow::EVENT_TYPES);
        catalog
    }

    pub fn register(&mut self, aggregate_type: &str, event_types: &[&str]) {
        for event_type in event_types {
            self.known
                .insert((aggregate_type.to_string(), event_type.to_string()));
        }
    }

    pub fn contains(&self, aggregate_type: &str, event_type: &str) -> bool {
        self.known
            .contains(&(aggregate_type.to_string(), event_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ErrorKind;

    fn event(payload: serde_json::Value) -> Event {
        Event {
            instance_id: "inst".to_string(),
            aggregate_type: user::AGGREGATE_TYPE.to_string(),
            aggregate_id: "u1".to_string(),
            resource_owner: "org1".to_string(),
            sequence: 3,
            position: 10,
            event_type: user::HUMAN_REFRESH_TOKEN_REMOVED.to_string(),
            created_at: Utc::now(),
            payload,
        }
    }

    #[test]
    fn test_decode_payload() {
        let e = event(serde_json::json!({"tokenId": "t1"}));
        let payload: user::RefreshTokenRemoved = e.decode("TEST-1").unwrap();
        assert_eq!(payload.token_id, "t1");
    }

    #[test]
    fn test_decode_failure_is_decode_kind() {
        let e = event(serde_json::json!({"tokenId": 42}));
        let err = e.decode::<user::RefreshTokenRemoved>("TEST-2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.diagnostic(), "TEST-2");
    }

    #[test]
    fn test_new_event_defaults_owner_to_aggregate() {
        let e = NewEvent::new("inst", org::AGGREGATE_TYPE, "org1", org::ORG_REMOVED);
        assert_eq!(e.resource_owner, "org1");
        let e = e.owned_by("other");
        assert_eq!(e.resource_owner, "other");
    }

    #[test]
    fn test_catalog() {
        let catalog = EventCatalog::iam();
        assert!(catalog.contains(user::AGGREGATE_TYPE, user::USER_REMOVED));
        assert!(catalog.contains(org::AGGREGATE_TYPE, flow::TRIGGER_ACTIONS_SET));
        assert!(!catalog.contains(user::AGGREGATE_TYPE, org::ORG_REMOVED));
    }
}
