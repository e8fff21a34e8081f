//! Mock RunLock implementation for testing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::storage::run_lock::lease_expiry;
use crate::storage::{LockOutcome, Result, RunLock};

/// Mock run lock. The write guard makes each call an atomic CAS.
#[derive(Default)]
pub struct MockRunLock {
    leases: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MockRunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a projection's lease, expired or not.
    pub async fn holder(&self, projection: &str) -> Option<String> {
        self.leases
            .read()
            .await
            .get(projection)
            .map(|(holder, _)| holder.clone())
    }

    /// Force a lease to expire now.
    pub async fn expire(&self, projection: &str) {
        if let Some(lease) = self.leases.write().await.get_mut(projection) {
            lease.1 = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

#[async_trait]
impl RunLock for MockRunLock {
    async fn try_acquire(
        &self,
        projection: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<LockOutcome> {
        let mut leases = self.leases.write().await;
        if let Some((current, expires_at)) = leases.get(projection) {
            if current != holder && *expires_at > Utc::now() {
                return Ok(LockOutcome::Held {
                    holder: current.clone(),
                    expires_at: *expires_at,
                });
            }
        }
        let expires_at = lease_expiry(lease);
        leases.insert(projection.to_string(), (holder.to_string(), expires_at));
        Ok(LockOutcome::Acquired { expires_at })
    }

    async fn renew(&self, projection: &str, holder: &str, lease: Duration) -> Result<bool> {
        let mut leases = self.leases.write().await;
        match leases.get_mut(projection) {
            Some((current, expires_at)) if current == holder && *expires_at > Utc::now() => {
                *expires_at = lease_expiry(lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, projection: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.write().await;
        if leases.get(projection).is_some_and(|(current, _)| current == holder) {
            leases.remove(projection);
        }
        Ok(())
    }
}
