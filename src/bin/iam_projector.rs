//! iam-projector: builds the IAM read-models from the event log.
//!
//! Runs the refresh token, password age policy and flow trigger projections
//! against a SQLite database until interrupted. Several processes may point at
//! the same database; the run lock keeps each projection on one of them.
//!
//! ## Configuration
//! - `config.yaml` in the working directory, the file given as first argument,
//!   or the file named by IAM_PROJECTOR_CONFIG
//! - IAM_PROJECTOR__* environment variables, e.g.
//!   `IAM_PROJECTOR__STORAGE__PATH=/var/lib/iam.db`
//! - IAM_PROJECTOR_LOG: tracing filter (default: info)

use std::sync::Arc;

use tracing::{error, info, warn};

use iam_projector::config::Config;
use iam_projector::events::EventCatalog;
use iam_projector::projection::ProjectionEngine;
use iam_projector::projections::{self, refresh_token::SqliteRefreshTokenView};
use iam_projector::storage::init_storage;
use iam_projector::utils::bootstrap::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let holder = config.holder_id();
    info!(holder = %holder, "Starting iam-projector");

    let storage = init_storage(&config.storage).await?;
    let refresh_tokens = Arc::new(SqliteRefreshTokenView::new(storage.pool.clone()));

    let mut engine = ProjectionEngine::new(storage.stores, EventCatalog::iam(), holder);
    projections::register_all(&mut engine, refresh_tokens, &config.projections).await?;

    let handle = engine.start();
    shutdown_signal().await;

    let mut failed = false;
    for (projection, result) in handle.shutdown().await {
        if let Err(e) = result {
            warn!(projection = %projection, diagnostic = e.diagnostic(), error = %e, "Projection halted");
            failed = true;
        }
    }

    if failed {
        return Err("one or more projections halted".into());
    }
    info!("iam-projector stopped");
    Ok(())
}
