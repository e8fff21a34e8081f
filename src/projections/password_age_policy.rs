//! Password age policy projection.
//!
//! One row per policy: org policies are keyed by the org id, the tenant
//! default by the instance id and flagged `is_default`.

use async_trait::async_trait;
use sea_query::{Alias, ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement};

use crate::events::policy::{self, PasswordAgePolicyAdded, PasswordAgePolicyChanged};
use crate::events::{instance, org, Event};
use crate::projection::{
    Binding, Column, Condition, ExecutorStrategy, Projection, ReduceError, Statement,
    StatementExecutor,
};
use crate::storage::StorageError;

pub const TABLE: &str = "password_age_policies";

pub const INSTANCE_ID: &str = "instance_id";
pub const ID: &str = "id";
pub const RESOURCE_OWNER: &str = "resource_owner";
pub const CREATION_DATE: &str = "creation_date";
pub const CHANGE_DATE: &str = "change_date";
pub const SEQUENCE: &str = "sequence";
pub const STATE: &str = "state";
pub const IS_DEFAULT: &str = "is_default";
pub const EXPIRE_WARN_DAYS: &str = "expire_warn_days";
pub const MAX_AGE_DAYS: &str = "max_age_days";

/// Policy state stored for every projected policy.
pub const STATE_ACTIVE: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordAgePolicyReducer {
    Added,
    Changed,
    Removed,
    OrgRemoved,
    InstanceRemoved,
}

#[derive(Debug, Default)]
pub struct PasswordAgePolicyProjection;

impl PasswordAgePolicyProjection {
    pub fn new() -> Self {
        Self
    }

    pub const STRATEGY: ExecutorStrategy = ExecutorStrategy::Batched;

    fn table() -> TableCreateStatement {
        Table::create()
            .table(Alias::new(TABLE))
            .if_not_exists()
            .col(ColumnDef::new(Alias::new(INSTANCE_ID)).text().not_null())
            .col(ColumnDef::new(Alias::new(ID)).text().not_null())
            .col(ColumnDef::new(Alias::new(RESOURCE_OWNER)).text().not_null())
            .col(ColumnDef::new(Alias::new(CREATION_DATE)).text().not_null())
            .col(ColumnDef::new(Alias::new(CHANGE_DATE)).text().not_null())
            .col(ColumnDef::new(Alias::new(SEQUENCE)).big_integer().not_null())
            .col(ColumnDef::new(Alias::new(STATE)).integer().not_null())
            .col(ColumnDef::new(Alias::new(IS_DEFAULT)).boolean().not_null())
            .col(ColumnDef::new(Alias::new(EXPIRE_WARN_DAYS)).big_integer().not_null())
            .col(ColumnDef::new(Alias::new(MAX_AGE_DAYS)).big_integer().not_null())
            .primary_key(
                Index::create()
                    .col(Alias::new(INSTANCE_ID))
                    .col(Alias::new(ID)),
            )
            .to_owned()
    }

    fn indexes() -> Vec<IndexCreateStatement> {
        vec![Index::create()
            .if_not_exists()
            .name("idx_password_age_policies_owner")
            .table(Alias::new(TABLE))
            .col(Alias::new(INSTANCE_ID))
            .col(Alias::new(RESOURCE_OWNER))
            .to_owned()]
    }

    fn reduce_added(event: &Event) -> Result<Vec<Statement>, ReduceError> {
        let payload: PasswordAgePolicyAdded = event.decode("PROJE-pAa01")?;
        Ok(vec![Statement::create(
            event,
            TABLE,
            vec![INSTANCE_ID, ID],
            vec![
                Column::new(INSTANCE_ID, &event.instance_id),
                Column::new(ID, &event.aggregate_id),
                Column::new(RESOURCE_OWNER, &event.resource_owner),
                Column::new(CREATION_DATE, event.created_at),
                Column::new(CHANGE_DATE, event.created_at),
                Column::new(SEQUENCE, event.sequence),
                Column::new(STATE, STATE_ACTIVE),
                Column::new(IS_DEFAULT, event.aggregate_type == instance::AGGREGATE_TYPE),
                Column::new(EXPIRE_WARN_DAYS, payload.expire_warn_days),
                Column::new(MAX_AGE_DAYS, payload.max_age_days),
            ],
        )])
    }

    fn reduce_changed(event: &Event) -> Result<Vec<Statement>, ReduceError> {
        let payload: PasswordAgePolicyChanged = event.decode("PROJE-pAc02")?;
        let mut columns = vec![
            Column::new(CHANGE_DATE, event.created_at),
            Column::new(SEQUENCE, event.sequence),
        ];
        if let Some(days) = payload.expire_warn_days {
            columns.push(Column::new(EXPIRE_WARN_DAYS, days));
        }
        if let Some(days) = payload.max_age_days {
            columns.push(Column::new(MAX_AGE_DAYS, days));
        }
        Ok(vec![Statement::update(
            event,
            TABLE,
            columns,
            vec![
                Condition::new(INSTANCE_ID, &event.instance_id),
                Condition::new(ID, &event.aggregate_id),
            ],
        )])
    }
}

#[async_trait]
impl Projection for PasswordAgePolicyProjection {
    type Reducer = PasswordAgePolicyReducer;

    fn name(&self) -> &str {
        TABLE
    }

    fn bindings(&self) -> Vec<Binding<Self::Reducer>> {
        use PasswordAgePolicyReducer::*;
        vec![
            Binding::new(org::AGGREGATE_TYPE, policy::ORG_PASSWORD_AGE_POLICY_ADDED, Added),
            Binding::new(org::AGGREGATE_TYPE, policy::ORG_PASSWORD_AGE_POLICY_CHANGED, Changed),
            Binding::new(org::AGGREGATE_TYPE, policy::ORG_PASSWORD_AGE_POLICY_REMOVED, Removed),
            Binding::new(org::AGGREGATE_TYPE, org::ORG_REMOVED, OrgRemoved),
            Binding::new(
                instance::AGGREGATE_TYPE,
                policy::INSTANCE_PASSWORD_AGE_POLICY_ADDED,
                Added,
            ),
            Binding::new(
                instance::AGGREGATE_TYPE,
                policy::INSTANCE_PASSWORD_AGE_POLICY_CHANGED,
                Changed,
            ),
            Binding::new(instance::AGGREGATE_TYPE, instance::INSTANCE_REMOVED, InstanceRemoved),
        ]
    }

    async fn reduce(
        &self,
        reducer: Self::Reducer,
        event: &Event,
    ) -> Result<Vec<Statement>, ReduceError> {
        match reducer {
            PasswordAgePolicyReducer::Added => Self::reduce_added(event),
            PasswordAgePolicyReducer::Changed => Self::reduce_changed(event),
            PasswordAgePolicyReducer::Removed => Ok(vec![Statement::delete(
                event,
                TABLE,
                vec![
                    Condition::new(INSTANCE_ID, &event.instance_id),
                    Condition::new(ID, &event.aggregate_id),
                ],
            )]),
            PasswordAgePolicyReducer::OrgRemoved => Ok(vec![Statement::delete(
                event,
                TABLE,
                vec![
                    Condition::new(INSTANCE_ID, &event.instance_id),
                    Condition::new(RESOURCE_OWNER, &event.aggregate_id),
                ],
            )]),
            PasswordAgePolicyReducer::InstanceRemoved => Ok(vec![Statement::delete(
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
