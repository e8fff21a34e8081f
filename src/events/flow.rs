//! Action flow events (org aggregate).

use serde::Deserialize;

pub const TRIGGER_ACTIONS_SET: &str = "flow.trigger_actions.set";
pub const FLOW_CLEARED: &str = "flow.cleared";

pub const EVENT_TYPES: &[&str] = &[TRIGGER_ACTIONS_SET, FLOW_CLEARED];

/// Replaces the ordered action list of one (flow, trigger) pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerActionsSet {
    pub flow_type: i32,
    pub trigger_type: i32,
    #[serde(rename = "actionIDs", default)]
    pub action_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowCleared {
    pub flow_type: i32,
}
