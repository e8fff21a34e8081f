//! Refresh token read-model: row shape, store trait and in-memory double.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::storage::{Result, StorageError};

/// One active refresh token.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRow {
    pub instance_id: String,
    /// Token id, unique within the tenant.
    pub id: String,
    pub user_id: String,
    pub resource_owner: String,
    pub client_id: String,
    pub user_agent_id: String,
    pub audience: Vec<String>,
    pub scopes: Vec<String>,
    pub auth_methods_references: Vec<String>,
    pub auth_time: DateTime<Utc>,
    pub idle_expiration: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    /// Current refresh token id; rotated on every renewal.
    pub refresh_token_id: String,
    pub preferred_language: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub change_date: DateTime<Utc>,
    /// Sequence of the user event that last wrote the row.
    pub sequence: u64,
}

/// Row store the refresh token projection writes through.
///
/// Writes are idempotent so an event replayed after a crash leaves the row
/// unchanged.
#[async_trait]
pub trait RefreshTokenView: Send + Sync {
    /// Create the backing table. Idempotent.
    async fn init(&self) -> Result<()>;

    /// Insert or overwrite the row keyed by (instance_id, id), unless the
    /// stored row already carries an equal or newer sequence. Returns whether
    /// the row was written.
    async fn put(&self, row: &RefreshTokenRow) -> Result<bool>;

    async fn by_id(&self, instance_id: &str, id: &str) -> Result<Option<RefreshTokenRow>>;

    async fn by_user(&self, instance_id: &str, user_id: &str) -> Result<Vec<RefreshTokenRow>>;

    async fn delete(&self, instance_id: &str, id: &str) -> Result<()>;

    async fn delete_by_user(&self, instance_id: &str, user_id: &str) -> Result<()>;

    async fn delete_by_org(&self, instance_id: &str, resource_owner: &str) -> Result<()>;

    async fn delete_by_instance(&self, instance_id: &str) -> Result<()>;
}

/// In-memory [`RefreshTokenView`] for tests.
#[derive(Default)]
pub struct MockRefreshTokenView {
    rows: RwLock<BTreeMap<(String, String), RefreshTokenRow>>,
    fail_next: RwLock<usize>,
}

impl MockRefreshTokenView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a transient error.
    pub async fn fail_next(&self, n: usize) {
        *self.fail_next.write().await = n;
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    async fn check(&self) -> Result<()> {
        let mut remaining = self.fail_next.write().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StorageError::Unavailable("mock view failure".into()));
        }
        Ok(())
    }

    async fn retain(&self, keep: impl Fn(&RefreshTokenRow) -> bool) -> Result<()> {
        self.check().await?;
        self.rows.write().await.retain(|_, row| keep(row));
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenView for MockRefreshTokenView {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn put(&self, row: &RefreshTokenRow) -> Result<bool> {
        self.check().await?;
        let mut rows = self.rows.write().await;
        let key = (row.instance_id.clone(), row.id.clone());
        match rows.get(&key) {
            Some(stored) if stored.sequence >= row.sequence => Ok(false),
            _ => {
                rows.insert(key, row.clone());
                Ok(true)
            }
        }
    }

    async fn by_id(&self, instance_id: &str, id: &str) -> Result<Option<RefreshTokenRow>> {
        self.check().await?;
        let key = (instance_id.to_string(), id.to_string());
        Ok(self.rows.read().await.get(&key).cloned())
    }

    async fn by_user(&self, instance_id: &str, user_id: &str) -> Result<Vec<RefreshTokenRow>> {
        self.check().await?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.instance_id == instance_id && r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, instance_id: &str, id: &str) -> Result<()> {
        self.retain(|r| !(r.instance_id == instance_id && r.id == id))
            .await
    }

    async fn delete_by_user(&self, instance_id: &str, user_id: &str) -> Result<()> {
        self.retain(|r| !(r.instance_id == instance_id && r.user_id == user_id))
            .await
    }

    async fn delete_by_org(&self, instance_id: &str, resource_owner: &str) -> Result<()> {
        self.retain(|r| !(r.instance_id == instance_id && r.resource_owner == resource_owner))
            .await
    }

    async fn delete_by_instance(&self, instance_id: &str) -> Result<()> {
        self.retain(|r| r.instance_id != instance_id).await
    }
}
