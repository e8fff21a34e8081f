//! IAM read-model projections.
//!
//! - [`refresh_token`]: active refresh tokens, direct-write
//! - [`password_age_policy`]: password age policies of orgs and tenants
//! - [`flow_trigger`]: actions attached to flow triggers

use std::sync::Arc;

use crate::config::ProjectionsConfig;
use crate::projection::{ProjectionEngine, ProjectionError};

pub mod flow_trigger;
pub mod password_age_policy;
pub mod refresh_token;

pub use flow_trigger::FlowTriggerProjection;
pub use password_age_policy::PasswordAgePolicyProjection;
pub use refresh_token::{RefreshTokenProjection, RefreshTokenView};

/// Register every IAM projection with settings resolved from `config`.
pub async fn register_all(
    engine: &mut ProjectionEngine,
    refresh_tokens: Arc<dyn RefreshTokenView>,
    config: &ProjectionsConfig,
) -> Result<(), ProjectionError> {
    engine
        .register_projection(
            RefreshTokenProjection::new(refresh_tokens),
            config.settings_for(refresh_token::NAME, RefreshTokenProjection::STRATEGY),
        )
        .await?;
    engine
        .register_projection(
            PasswordAgePolicyProjection::new(),
            config.settings_for(password_age_policy::TABLE, PasswordAgePolicyProjection::STRATEGY),
        )
        .await?;
    engine
        .register_projection(
            FlowTriggerProjection::new(),
            config.settings_for(flow_trigger::TABLE, FlowTriggerProjection::STRATEGY),
        )
        .await?;
    Ok(())
}
