//! User aggregate events.

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const AGGREGATE_TYPE: &str = "user";

pub const HUMAN_ADDED: &str = "user.human.added";
pub const HUMAN_EMAIL_CHANGED: &str = "user.human.email.changed";
pub const HUMAN_REFRESH_TOKEN_ADDED: &str = "user.human.refresh.token.added";
pub const HUMAN_REFRESH_TOKEN_RENEWED: &str = "user.human.refresh.token.renewed";
pub const HUMAN_REFRESH_TOKEN_REMOVED: &str = "user.human.refresh.token.removed";
pub const USER_LOCKED: &str = "user.locked";
pub const USER_UNLOCKED: &str = "user.unlocked";
pub const USER_DEACTIVATED: &str = "user.deactivated";
pub const USER_REACTIVATED: &str = "user.reactivated";
pub const USER_REMOVED: &str = "user.removed";

pub const EVENT_TYPES: &[&str] = &[
    HUMAN_ADDED,
    HUMAN_EMAIL_CHANGED,
    HUMAN_REFRESH_TOKEN_ADDED,
    HUMAN_REFRESH_TOKEN_RENEWED,
    HUMAN_REFRESH_TOKEN_REMOVED,
    USER_LOCKED,
    USER_UNLOCKED,
    USER_DEACTIVATED,
    USER_REACTIVATED,
    USER_REMOVED,
];

/// Payload of `user.human.refresh.token.added`.
///
/// Expirations are lifetimes in seconds relative to the event's creation time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenAdded {
    pub token_id: String,
    pub client_id: String,
    #[serde(default)]
    pub user_agent_id: String,
    #[serde(default)]
    pub audience: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub auth_methods_references: Vec<String>,
    pub auth_time: DateTime<Utc>,
    pub idle_expiration: i64,
    pub expiration: i64,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

/// Payload of `user.human.refresh.token.renewed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRenewed {
    pub token_id: String,
    pub refresh_token_id: String,
    pub idle_expiration: i64,
}

/// Payload of `user.human.refresh.token.removed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRemoved {
    pub token_id: String,
}
