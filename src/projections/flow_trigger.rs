//! Action flow trigger projection.
//!
//! Rows map (org, flow type, trigger type) to an ordered list of action ids.
//! Setting the actions of a trigger replaces the whole list.

use async_trait::async_trait;
use sea_query::{Alias, ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement};

use crate::events::flow::{self, FlowCleared, TriggerActionsSet};
use crate::events::{instance, org, Event};
use crate::projection::{
    Binding, Column, Condition, ExecutorStrategy, Projection, ReduceError, Statement,
    StatementExecutor,
};
use crate::storage::StorageError;

pub const TABLE: &str = "flow_triggers";

pub const INSTANCE_ID: &str = "instance_id";
pub const RESOURCE_OWNER: &str = "resource_owner";
pub const FLOW_TYPE: &str = "flow_type";
pub const TRIGGER_TYPE: &str = "trigger_type";
pub const ACTION_ID: &str = "action_id";
/// Position of the action within its trigger, starting at 0.
pub const TRIGGER_SEQUENCE: &str = "trigger_sequence";
pub const CREATION_DATE: &str = "creation_date";
pub const CHANGE_DATE: &str = "change_date";
pub const SEQUENCE: &str = "sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowTriggerReducer {
    TriggerActionsSet,
    FlowCleared,
    OrgRemoved,
    InstanceRemoved,
}

#[derive(Debug, Default)]
pub struct FlowTriggerProjection;

impl FlowTriggerProjection {
    pub fn new() -> Self {
        Self
    }

    pub const STRATEGY: ExecutorStrategy = ExecutorStrategy::Batched;

    fn table() -> TableCreateStatement {
        Table::create()
            .table(Alias::new(TABLE))
            .if_not_exists()
            .col(ColumnDef::new(Alias::new(INSTANCE_ID)).text().not_null())
            .col(ColumnDef::new(Alias::new(RESOURCE_OWNER)).text().not_null())
            .col(ColumnDef::new(Alias::new(FLOW_TYPE)).integer().not_null())
            .col(ColumnDef::new(Alias::new(TRIGGER_TYPE)).integer().not_null())
            .col(ColumnDef::new(Alias::new(ACTION_ID)).text().not_null())
            .col(ColumnDef::new(Alias::new(TRIGGER_SEQUENCE)).integer().not_null())
            .col(ColumnDef::new(Alias::new(CREATION_DATE)).text().not_null())
            .col(ColumnDef::new(Alias::new(CHANGE_DATE)).text().not_null())
            .col(ColumnDef::new(Alias::new(SEQUENCE)).big_integer().not_null())
            .primary_key(
                Index::create()
                    .col(Alias::new(INSTANCE_ID))
                    .col(Alias::new(RESOURCE_OWNER))
                    .col(Alias::new(FLOW_TYPE))
                    .col(Alias::new(TRIGGER_TYPE))
                    .col(Alias::new(ACTION_ID)),
            )
            .to_owned()
    }

    fn indexes() -> Vec<IndexCreateStatement> {
        Vec::new()
    }

    fn reduce_set(event: &Event) -> Result<Vec<Statement>, ReduceError> {
        let payload: TriggerActionsSet = event.decode("PROJE-fTs01")?;

        let mut statements = Vec::with_capacity(payload.action_ids.len() + 1);
        statements.push(Statement::delete(
            event,
            TABLE,
            vec![
                Condition::new(INSTANCE_ID, &event.instance_id),
                Condition::new(RESOURCE_OWNER, &event.aggregate_id),
                Condition::new(FLOW_TYPE, payload.flow_type),
                Condition::new(TRIGGER_TYPE, payload.trigger_type),
            ],
        ));
        for (index, action_id) in payload.action_ids.iter().enumerate() {
            statements.push(Statement::create(
                event,
                TABLE,
                vec![INSTANCE_ID, RESOURCE_OWNER, FLOW_TYPE, TRIGGER_TYPE, ACTION_ID],
                vec![
                    Column::new(INSTANCE_ID, &event.instance_id),
                    Column::new(RESOURCE_OWNER, &event.aggregate_id),
                    Column::new(FLOW_TYPE, payload.flow_type),
                    Column::new(TRIGGER_TYPE, payload.trigger_type),
                    Column::new(ACTION_ID, action_id),
                    Column::new(TRIGGER_SEQUENCE, index),
                    Column::new(CREATION_DATE, event.created_at),
                    Column::new(CHANGE_DATE, event.created_at),
                    Column::new(SEQUENCE, event.sequence),
                ],
            ));
        }
        Ok(statements)
    }

    fn reduce_cleared(event: &Event) -> Result<Vec<Statement>, ReduceError> {
        let payload: FlowCleared = event.decode("PROJE-fTc02")?;
        Ok(vec![Statement::delete(
            event,
            TABLE,
            vec![
                Condition::new(INSTANCE_ID, &event.instance_id),
                Condition::new(RESOURCE_OWNER, &event.aggregate_id),
                Condition::new(FLOW_TYPE, payload.flow_type),
            ],
        )])
    }
}

#[async_trait]
impl Projection for FlowTriggerProjection {
    type Reducer = FlowTriggerReducer;

    fn name(&self) -> &str {
        TABLE
    }

    fn bindings(&self) -> Vec<Binding<Self::Reducer>> {
        vec![
            Binding::new(
                org::AGGREGATE_TYPE,
                flow::TRIGGER_ACTIONS_SET,
                FlowTriggerReducer::TriggerActionsSet,
            ),
            Binding::new(
                org::AGGREGATE_TYPE,
                flow::FLOW_CLEARED,
                FlowTriggerReducer::FlowCleared,
            ),
            Binding::new(
                org::AGGREGATE_TYPE,
                org::ORG_REMOVED,
                FlowTriggerReducer::OrgRemoved,
            ),
            Binding::new(
                instance::AGGREGATE_TYPE,
                instance::INSTANCE_REMOVED,
                FlowTriggerReducer::InstanceRemoved,
            ),
        ]
    }

    async fn reduce(
        &self,
        reducer: Self::Reducer,
        event: &Event,
    ) -> Result<Vec<Statement>, ReduceError> {
        match reducer {
            FlowTriggerReducer::TriggerActionsSet => Self::reduce_set(event),
            FlowTriggerReducer::FlowCleared => Self::reduce_cleared(event),
            FlowTriggerReducer::OrgRemoved => Ok(vec![Statement::delete(
                event,
                TABLE,
                vec![
                    Condition::new(INSTANCE_ID, &event.instance_id),
                    Condition::new(RESOURCE_OWNER, &event.aggregate_id),
                ],
            )]),
            FlowTriggerReducer::InstanceRemoved => Ok(vec![Statement::delete(
                event,
                TABLE,
                vec![Condition::new(INSTANCE_ID, &event.instance_id)],
            )]),
        }
    }

    async fn init(&self, executor: &dyn StatementExecutor) -> Result<(), StorageError> {
        executor.ensure_table(Self::table(), Self::indexes()).await
    }
}
