//! Instance (tenant) aggregate events.
//!
//! `instance.removed` is the widest fan-out in the system: every projection
//! deletes all rows belonging to the tenant.

pub const AGGREGATE_TYPE: &str = "instance";

pub const INSTANCE_ADDED: &str = "instance.added";
pub const INSTANCE_REMOVED: &str = "instance.removed";

pub const EVENT_TYPES: &[&str] = &[INSTANCE_ADDED, INSTANCE_REMOVED];
