//! SQLite RefreshTokenView implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{
    ColumnDef, Expr, Index, IndexCreateStatement, OnConflict, Query, SelectStatement, Table,
    TableCreateStatement,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::view::{RefreshTokenRow, RefreshTokenView};
use crate::storage::sqlite::{build_query, build_schema};
use crate::storage::{Result, StorageError};

#[derive(sea_query::Iden)]
enum AuthRefreshTokens {
    Table,
    InstanceId,
    Id,
    UserId,
    ResourceOwner,
    ClientId,
    UserAgentId,
    Audience,
    Scopes,
    #[iden = "amr"]
    AuthMethodsReferences,
    AuthTime,
    IdleExpiration,
    Expiration,
    RefreshTokenId,
    PreferredLanguage,
    CreationDate,
    ChangeDate,
    Sequence,
}

const COLUMNS: [AuthRefreshTokens; 17] = [
    AuthRefreshTokens::InstanceId,
    AuthRefreshTokens::Id,
    AuthRefreshTokens::UserId,
    AuthRefreshTokens::ResourceOwner,
    AuthRefreshTokens::ClientId,
    AuthRefreshTokens::UserAgentId,
    AuthRefreshTokens::Audience,
    AuthRefreshTokens::Scopes,
    AuthRefreshTokens::AuthMethodsReferences,
    AuthRefreshTokens::AuthTime,
    AuthRefreshTokens::IdleExpiration,
    AuthRefreshTokens::Expiration,
    AuthRefreshTokens::RefreshTokenId,
    AuthRefreshTokens::PreferredLanguage,
    AuthRefreshTokens::CreationDate,
    AuthRefreshTokens::ChangeDate,
    AuthRefreshTokens::Sequence,
];

fn create_table() -> TableCreateStatement {
    Table::create()
        .table(AuthRefreshTokens::Table)
        .if_not_exists()
        .col(ColumnDef::new(AuthRefreshTokens::InstanceId).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::Id).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::UserId).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::ResourceOwner).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::ClientId).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::UserAgentId).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::Audience).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::Scopes).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::AuthMethodsReferences).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::AuthTime).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::IdleExpiration).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::Expiration).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::RefreshTokenId).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::PreferredLanguage).text())
        .col(ColumnDef::new(AuthRefreshTokens::CreationDate).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::ChangeDate).text().not_null())
        .col(ColumnDef::new(AuthRefreshTokens::Sequence).big_integer().not_null())
        .primary_key(
            Index::create()
                .col(AuthRefreshTokens::InstanceId)
                .col(AuthRefreshTokens::Id),
        )
        .to_owned()
}

fn create_user_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_auth_refresh_tokens_user")
        .table(AuthRefreshTokens::Table)
        .col(AuthRefreshTokens::InstanceId)
        .col(AuthRefreshTokens::UserId)
        .to_owned()
}

/// SQLite implementation of RefreshTokenView.
pub struct SqliteRefreshTokenView {
    pool: SqlitePool,
}

impl SqliteRefreshTokenView {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn select() -> SelectStatement {
        Query::select()
            .columns(COLUMNS)
            .from(AuthRefreshTokens::Table)
            .to_owned()
    }

    fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
        let raw: String = row.get(column);
        Ok(DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| StorageError::InvalidData(format!("{column} {raw}: {e}")))?
            .with_timezone(&Utc))
    }

    fn list(row: &SqliteRow, column: &str) -> Result<Vec<String>> {
        let raw: String = row.get(column);
        Ok(serde_json::from_str(&raw)?)
    }

    fn decode_row(row: &SqliteRow) -> Result<RefreshTokenRow> {
        let sequence: i64 = row.get("sequence");
        Ok(RefreshTokenRow {
            instance_id: row.get("instance_id"),
            id: row.get("id"),
            user_id: row.get("user_id"),
            resource_owner: row.get("resource_owner"),
            client_id: row.get("client_id"),
            user_agent_id: row.get("user_agent_id"),
            audience: Self::list(row, "audience")?,
            scopes: Self::list(row, "scopes")?,
            auth_methods_references: Self::list(row, "amr")?,
            auth_time: Self::timestamp(row, "auth_time")?,
            idle_expiration: Self::timestamp(row, "idle_expiration")?,
            expiration: Self::timestamp(row, "expiration")?,
            refresh_token_id: row.get("refresh_token_id"),
            preferred_language: row.get("preferred_language"),
            creation_date: Self::timestamp(row, "creation_date")?,
            change_date: Self::timestamp(row, "change_date")?,
            sequence: sequence as u64,
        })
    }

    async fn delete_where(&self, conditions: Vec<sea_query::SimpleExpr>) -> Result<()> {
        let mut delete = Query::delete();
        delete.from_table(AuthRefreshTokens::Table);
        for condition in conditions {
            delete.and_where(condition);
        }
        sqlx::query(&build_query(&delete)).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenView for SqliteRefreshTokenView {
    async fn init(&self) -> Result<()> {
        sqlx::query(&build_schema(create_table()))
            .execute(&self.pool)
            .await?;
        sqlx::query(&build_schema(create_user_index()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put(&self, row: &RefreshTokenRow) -> Result<bool> {
        let query = build_query(
            Query::insert()
                .into_table(AuthRefreshTokens::Table)
                .columns(COLUMNS)
                .values_panic([
                    row.instance_id.as_str().into(),
                    row.id.as_str().into(),
                    row.user_id.as_str().into(),
                    row.resource_owner.as_str().into(),
                    row.client_id.as_str().into(),
                    row.user_agent_id.as_str().into(),
                    serde_json::to_string(&row.audience)?.into(),
                    serde_json::to_string(&row.scopes)?.into(),
                    serde_json::to_string(&row.auth_methods_references)?.into(),
                    row.auth_time.to_rfc3339().into(),
                    row.idle_expiration.to_rfc3339().into(),
                    row.expiration.to_rfc3339().into(),
                    row.refresh_token_id.as_str().into(),
                    row.preferred_language.clone().into(),
                    row.creation_date.to_rfc3339().into(),
                    row.change_date.to_rfc3339().into(),
                    (row.sequence as i64).into(),
                ])
                .on_conflict(
                    OnConflict::columns([AuthRefreshTokens::InstanceId, AuthRefreshTokens::Id])
                        .update_columns(COLUMNS.into_iter().skip(2))
                        .action_and_where(
                            Expr::col((AuthRefreshTokens::Table, AuthRefreshTokens::Sequence))
                                .lt(row.sequence as i64),
                        )
                        .to_owned(),
                ),
        );

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn by_id(&self, instance_id: &str, id: &str) -> Result<Option<RefreshTokenRow>> {
        let query = build_query(
            Self::select()
                .and_where(Expr::col(AuthRefreshTokens::InstanceId).eq(instance_id))
                .and_where(Expr::col(AuthRefreshTokens::Id).eq(id)),
        );
        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn by_user(&self, instance_id: &str, user_id: &str) -> Result<Vec<RefreshTokenRow>> {
        let query = build_query(
            Self::select()
                .and_where(Expr::col(AuthRefreshTokens::InstanceId).eq(instance_id))
                .and_where(Expr::col(AuthRefreshTokens::UserId).eq(user_id))
                .order_by(AuthRefreshTokens::Id, sea_query::Order::Asc),
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn delete(&self, instance_id: &str, id: &str) -> Result<()> {
        self.delete_where(vec![
            Expr::col(AuthRefreshTokens::InstanceId).eq(instance_id),
            Expr::col(AuthRefreshTokens::Id).eq(id),
        ])
        .await
    }

    async fn delete_by_user(&self, instance_id: &str, user_id: &str) -> Result<()> {
        self.delete_where(vec![
            Expr::col(AuthRefreshTokens::InstanceId).eq(instance_id),
            Expr::col(AuthRefreshTokens::UserId).eq(user_id),
        ])
        .await
    }

    async fn delete_by_org(&self, instance_id: &str, resource_owner: &str) -> Result<()> {
        self.delete_where(vec![
            Expr::col(AuthRefreshTokens::InstanceId).eq(instance_id),
            Expr::col(AuthRefreshTokens::ResourceOwner).eq(resource_owner),
        ])
        .await
    }

    async fn delete_by_instance(&self, instance_id: &str) -> Result<()> {
        self.delete_where(vec![Expr::col(AuthRefreshTokens::InstanceId).eq(instance_id)])
            .await
    }
}
