//! Statements: the logical output of one reduction.
//!
//! A statement names its target table and addresses rows by column/value
//! conditions. It never carries a query language; backends translate it.

use chrono::{DateTime, Utc};

use crate::events::Event;

/// Logical column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Column to set.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub value: Value,
}

impl Column {
    pub fn new(name: &'static str, value: impl Into<Value>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Equality condition addressing rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: &'static str,
    pub value: Value,
}

impl Condition {
    pub fn new(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

/// Idempotency marker: which event produced the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMarker {
    pub instance_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub sequence: u64,
    pub position: u64,
}

impl From<&Event> for EventMarker {
    fn from(event: &Event) -> Self {
        Self {
            instance_id: event.instance_id.clone(),
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            sequence: event.sequence,
            position: event.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert-or-ignore keyed by the row's natural business key.
    Create {
        key: Vec<&'static str>,
        columns: Vec<Column>,
    },
    Update {
        columns: Vec<Column>,
        conditions: Vec<Condition>,
    },
    /// Delete-if-exists.
    Delete { conditions: Vec<Condition> },
    /// Event observed, nothing to change. Still advances the position.
    NoOp,
}

/// One storage mutation produced by a reducer.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub table: &'static str,
    pub operation: Operation,
    pub marker: EventMarker,
    /// Must commit in the same transaction as the position advance.
    pub in_position_tx: bool,
}

impl Statement {
    pub fn create(
        event: &Event,
        table: &'static str,
        key: Vec<&'static str>,
        columns: Vec<Column>,
    ) -> Self {
        Self {
            table,
            operation: Operation::Create { key, columns },
            marker: event.into(),
            in_position_tx: true,
        }
    }

    pub fn update(
        event: &Event,
        table: &'static str,
        columns: Vec<Column>,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            table,
            operation: Operation::Update {
                columns,
                conditions,
            },
            marker: event.into(),
            in_position_tx: true,
        }
    }

    pub fn delete(event: &Event, table: &'static str, conditions: Vec<Condition>) -> Self {
        Self {
            table,
            operation: Operation::Delete { conditions },
            marker: event.into(),
            in_position_tx: true,
        }
    }

    pub fn no_op(event: &Event) -> Self {
        Self {
            table: "",
            operation: Operation::NoOp,
            marker: event.into(),
            in_position_tx: false,
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self.operation, Operation::NoOp)
    }
}
