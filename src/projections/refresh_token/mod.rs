//! Refresh token projection.
//!
//! Direct-write: reducers mutate the [`RefreshTokenView`] themselves and hand
//! the scheduler a no-op statement, so the position advances after every
//! event. Every write is guarded by the user aggregate's sequence, which makes
//! replaying the last event harmless.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::events::user::{self, RefreshTokenAdded, RefreshTokenRenewed, RefreshTokenRemoved};
use crate::events::{instance, org, Event};
use crate::projection::{
    Binding, ExecutorStrategy, Projection, ReduceError, Statement, StatementExecutor,
};
use crate::storage::StorageError;

#[cfg(feature = "sqlite")]
mod sqlite;
mod view;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRefreshTokenView;
pub use view::{MockRefreshTokenView, RefreshTokenRow, RefreshTokenView};

pub const NAME: &str = "auth_refresh_tokens";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenReducer {
    Added,
    Renewed,
    Removed,
    /// User locked, deactivated or removed: all of the user's tokens go.
    UserTerminated,
    OrgRemoved,
    InstanceRemoved,
}

pub struct RefreshTokenProjection {
    view: Arc<dyn RefreshTokenView>,
}

impl RefreshTokenProjection {
    pub const STRATEGY: ExecutorStrategy = ExecutorStrategy::DirectWrite;

    pub fn new(view: Arc<dyn RefreshTokenView>) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &Arc<dyn RefreshTokenView> {
        &self.view
    }

    async fn added(&self, event: &Event) -> Result<(), ReduceError> {
        let payload: RefreshTokenAdded = event.decode("PROJE-rTa01")?;
        let row = RefreshTokenRow {
            instance_id: event.instance_id.clone(),
            refresh_token_id: payload.token_id.clone(),
            id: payload.token_id,
            user_id: event.aggregate_id.clone(),
            resource_owner: event.resource_owner.clone(),
            client_id: payload.client_id,
            user_agent_id: payload.user_agent_id,
            audience: payload.audience,
            scopes: payload.scopes,
            auth_methods_references: payload.auth_methods_references,
            auth_time: payload.auth_time,
            idle_expiration: expires_after(event, payload.idle_expiration, "PROJE-rTa05")?,
            expiration: expires_after(event, payload.expiration, "PROJE-rTa05")?,
            preferred_language: payload.preferred_language,
            creation_date: event.created_at,
            change_date: event.created_at,
            sequence: event.sequence,
        };
        self.view.put(&row).await?;
        Ok(())
    }

    async fn renewed(&self, event: &Event) -> Result<(), ReduceError> {
        let payload: RefreshTokenRenewed = event.decode("PROJE-rTr02")?;
        let mut row = self
            .view
            .by_id(&event.instance_id, &payload.token_id)
            .await?
            .ok_or_else(|| {
                ReduceError::not_found(
                    "PROJE-rTr03",
                    format!(
                        "refresh token {} of user {} not found",
                        payload.token_id, event.aggregate_id
                    ),
                )
            })?;
        if row.sequence >= event.sequence {
            return Ok(());
        }

        row.idle_expiration = expires_after(event, payload.idle_expiration, "PROJE-rTr06")?;
        row.refresh_token_id = payload.refresh_token_id;
        row.change_date = event.created_at;
        row.sequence = event.sequence;
        self.view.put(&row).await?;
        Ok(())
    }

    async fn removed(&self, event: &Event) -> Result<(), ReduceError> {
        let payload: RefreshTokenRemoved = event.decode("PROJE-rTd04")?;
        self.view
            .delete(&event.instance_id, &payload.token_id)
            .await?;
        Ok(())
    }
}

/// The event's creation time plus `seconds`. Out-of-range lifetimes are a
/// decode error.
fn expires_after(
    event: &Event,
    seconds: i64,
    diagnostic: &'static str,
) -> Result<DateTime<Utc>, ReduceError> {
    Duration::try_seconds(seconds)
        .and_then(|lifetime| event.created_at.checked_add_signed(lifetime))
        .ok_or_else(|| {
            ReduceError::decode(
                diagnostic,
                format!("token lifetime of {seconds}s is out of range"),
            )
        })
}

#[async_trait]
impl Projection for RefreshTokenProjection {
    type Reducer = RefreshTokenReducer;

    fn name(&self) -> &str {
        NAME
    }

    fn bindings(&self) -> Vec<Binding<Self::Reducer>> {
        use RefreshTokenReducer::*;
        vec![
            Binding::new(user::AGGREGATE_TYPE, user::HUMAN_REFRESH_TOKEN_ADDED, Added),
            Binding::new(user::AGGREGATE_TYPE, user::HUMAN_REFRESH_TOKEN_RENEWED, Renewed),
            Binding::new(user::AGGREGATE_TYPE, user::HUMAN_REFRESH_TOKEN_REMOVED, Removed),
            Binding::new(user::AGGREGATE_TYPE, user::USER_LOCKED, UserTerminated),
            Binding::new(user::AGGREGATE_TYPE, user::USER_DEACTIVATED, UserTerminated),
            Binding::new(user::AGGREGATE_TYPE, user::USER_REMOVED, UserTerminated),
            Binding::new(org::AGGREGATE_TYPE, org::ORG_REMOVED, OrgRemoved),
            Binding::new(instance::AGGREGATE_TYPE, instance::INSTANCE_REMOVED, InstanceRemoved),
        ]
    }

    async fn reduce(
        &self,
        reducer: Self::Reducer,
        event: &Event,
    ) -> Result<Vec<Statement>, ReduceError> {
        match reducer {
            RefreshTokenReducer::Added => self.added(event).await?,
            RefreshTokenReducer::Renewed => self.renewed(event).await?,
            RefreshTokenReducer::Removed => self.removed(event).await?,
            RefreshTokenReducer::UserTerminated => {
                self.view
                    .delete_by_user(&event.instance_id, &event.aggregate_id)
                    .await?
            }
            RefreshTokenReducer::OrgRemoved => {
                self.view
                    .delete_by_org(&event.instance_id, &event.aggregate_id)
                    .await?
            }
            RefreshTokenReducer::InstanceRemoved => {
                self.view.delete_by_instance(&event.instance_id).await?
            }
        }
        Ok(vec![Statement::no_op(event)])
    }

    async fn init(&self, _executor: &dyn StatementExecutor) -> Result<(), StorageError> {
        self.view.init().await
    }
}
