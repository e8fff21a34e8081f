//! RunLock trait definition.
//!
//! One lease per projection name. Holders acquire it before a processing
//! cycle, renew it before every batch and release it afterwards. An expired
//! lease may be taken over by any other holder, so a crashed instance never
//! blocks a projection for longer than one lease.
//!
//! Renewal alone does not stop a holder whose lease ran out mid-batch from
//! committing. Every commit therefore carries a [`LeaseFence`] that the
//! executor re-checks inside its transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired { expires_at: DateTime<Utc> },
    /// Another holder owns an unexpired lease.
    Held {
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

impl LockOutcome {
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }
}

/// Lease a commit must still hold when it lands.
///
/// Checking the fence extends the lease, exactly like [`RunLock::renew`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseFence {
    pub projection: String,
    pub holder: String,
    pub lease: Duration,
}

impl LeaseFence {
    pub fn new(projection: impl Into<String>, holder: impl Into<String>, lease: Duration) -> Self {
        Self {
            projection: projection.into(),
            holder: holder.into(),
            lease,
        }
    }
}

/// Lease-based mutual exclusion across processes.
///
/// # Implementations
///
/// - `SqliteRunLock`: SQLite storage
/// - `MockRunLock`: In-memory mock for testing
#[async_trait]
pub trait RunLock: Send + Sync {
    /// Compare-and-swap acquire: succeeds when the lock is free, expired or
    /// already held by `holder`.
    async fn try_acquire(
        &self,
        projection: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<LockOutcome>;

    /// Extend an unexpired lease. Returns `false` if `holder` no longer owns
    /// it or it has already expired.
    async fn renew(&self, projection: &str, holder: &str, lease: Duration) -> Result<bool>;

    /// Release the lease if `holder` owns it. Releasing a lock held by
    /// someone else is a no-op.
    async fn release(&self, projection: &str, holder: &str) -> Result<()>;
}

/// Expiry for a lease starting now. Saturates instead of overflowing.
pub(crate) fn lease_expiry(lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| Utc::now().checked_add_signed(lease))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_expiry_saturates() {
        assert_eq!(lease_expiry(Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert!(lease_expiry(Duration::from_secs(30)) > Utc::now());
    }
}
