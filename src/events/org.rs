//! Organisation aggregate events.
//!
//! Policy and flow events are emitted on the org aggregate too; see
//! [`super::policy`] and [`super::flow`].

pub const AGGREGATE_TYPE: &str = "org";

pub const ORG_ADDED: &str = "org.added";
pub const ORG_REMOVED: &str = "org.removed";

pub const EVENT_TYPES: &[&str] = &[ORG_ADDED, ORG_REMOVED];
