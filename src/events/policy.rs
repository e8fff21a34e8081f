//! Password age policy events.
//!
//! Emitted on the org aggregate for org-specific policies and on the instance
//! aggregate for the tenant default. Both share one payload shape.

use serde::Deserialize;

pub const ORG_PASSWORD_AGE_POLICY_ADDED: &str = "org.policy.password.age.added";
pub const ORG_PASSWORD_AGE_POLICY_CHANGED: &str = "org.policy.password.age.changed";
pub const ORG_PASSWORD_AGE_POLICY_REMOVED: &str = "org.policy.password.age.removed";

pub const INSTANCE_PASSWORD_AGE_POLICY_ADDED: &str = "instance.policy.password.age.added";
pub const INSTANCE_PASSWORD_AGE_POLICY_CHANGED: &str = "instance.policy.password.age.changed";

pub const ORG_EVENT_TYPES: &[&str] = &[
    ORG_PASSWORD_AGE_POLICY_ADDED,
    ORG_PASSWORD_AGE_POLICY_CHANGED,
    ORG_PASSWORD_AGE_POLICY_REMOVED,
];

pub const INSTANCE_EVENT_TYPES: &[&str] = &[
    INSTANCE_PASSWORD_AGE_POLICY_ADDED,
    INSTANCE_PASSWORD_AGE_POLICY_CHANGED,
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordAgePolicyAdded {
    pub expire_warn_days: u64,
    pub max_age_days: u64,
}

/// Only the fields present in the payload change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordAgePolicyChanged {
    #[serde(default)]
    pub expire_warn_days: Option<u64>,
    #[serde(default)]
    pub max_age_days: Option<u64>,
}
