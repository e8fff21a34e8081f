//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building,
//! plus the DDL each store runs from its `init()`.

use sea_query::{ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement};

/// Events table schema.
#[derive(sea_query::Iden)]
pub enum Events {
    Table,
    InstanceId,
    AggregateType,
    AggregateId,
    ResourceOwner,
    Sequence,
    Position,
    EventType,
    CreatedAt,
    Payload,
}

/// Projection positions table schema.
#[derive(sea_query::Iden)]
pub enum Positions {
    #[iden = "projection_positions"]
    Table,
    Projection,
    InstanceId,
    AggregateType,
    Position,
    AggregateId,
    Sequence,
    UpdatedAt,
}

/// Run locks table schema.
#[derive(sea_query::Iden)]
pub enum ProjectionLocks {
    Table,
    Projection,
    Holder,
    /// Lease expiry in unix milliseconds.
    ExpiresAt,
}

pub fn create_events_table() -> TableCreateStatement {
    Table::create()
        .table(Events::Table)
        .if_not_exists()
        .col(ColumnDef::new(Events::InstanceId).text().not_null())
        .col(ColumnDef::new(Events::AggregateType).text().not_null())
        .col(ColumnDef::new(Events::AggregateId).text().not_null())
        .col(ColumnDef::new(Events::ResourceOwner).text().not_null())
        .col(ColumnDef::new(Events::Sequence).big_integer().not_null())
        .col(ColumnDef::new(Events::Position).big_integer().not_null().unique_key())
        .col(ColumnDef::new(Events::EventType).text().not_null())
        .col(ColumnDef::new(Events::CreatedAt).text().not_null())
        .col(ColumnDef::new(Events::Payload).text().not_null())
        .primary_key(
            Index::create()
                .col(Events::InstanceId)
                .col(Events::AggregateType)
                .col(Events::AggregateId)
                .col(Events::Sequence),
        )
        .to_owned()
}

/// Serves the scheduler's per-tenant fetch ordered by position.
pub fn create_events_position_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_events_instance_position")
        .table(Events::Table)
        .col(Events::InstanceId)
        .col(Events::Position)
        .to_owned()
}

pub fn create_positions_table() -> TableCreateStatement {
    Table::create()
        .table(Positions::Table)
        .if_not_exists()
        .col(ColumnDef::new(Positions::Projection).text().not_null())
        .col(ColumnDef::new(Positions::InstanceId).text().not_null())
        .col(ColumnDef::new(Positions::AggregateType).text().not_null())
        .col(ColumnDef::new(Positions::Position).big_integer().not_null())
        .col(ColumnDef::new(Positions::AggregateId).text().not_null())
        .col(ColumnDef::new(Positions::Sequence).big_integer().not_null())
        .col(ColumnDef::new(Positions::UpdatedAt).text().not_null())
        .primary_key(
            Index::create()
                .col(Positions::Projection)
                .col(Positions::InstanceId)
                .col(Positions::AggregateType),
        )
        .to_owned()
}

pub fn create_locks_table() -> TableCreateStatement {
    Table::create()
        .table(ProjectionLocks::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(ProjectionLocks::Projection)
                .text()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(ProjectionLocks::Holder).text().not_null())
        .col(ColumnDef::new(ProjectionLocks::ExpiresAt).big_integer().not_null())
        .to_owned()
}
