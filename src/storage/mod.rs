//! Storage backends for Storelink
//!
//! Provides the credential store with a unified trait interface over an
//! in-memory and a SQLite backend.

pub mod memory;
pub mod sqlite;

use crate::{Result, model::Credential};
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence for OAuth credentials, keyed by `authorized_app_id`
///
/// Writes are full-record replacements. Soft-deleted records are invisible to
/// every read.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get the live credential for an authorized app
    async fn get(&self, authorized_app_id: &str) -> Result<Option<Credential>>;

    /// Insert a credential unless a live one already exists for its key
    ///
    /// Returns the stored record: the existing one when present, otherwise the
    /// newly inserted one.
    async fn insert(&self, credential: &Credential) -> Result<Credential>;

    /// Insert or fully replace the credential for its key
    async fn replace(&self, credential: &Credential) -> Result<Credential>;

    /// Replace the live credential only while it still holds `expected_refresh_token`
    ///
    /// Returns `None` when the record was deleted or rotated by another writer
    /// since it was read; nothing is written in that case.
    async fn replace_if_current(
        &self,
        credential: &Credential,
        expected_refresh_token: &str,
    ) -> Result<Option<Credential>>;

    /// Mark the credential as deleted
    ///
    /// Fails with `CredentialNotFound` when there is no live credential.
    async fn soft_delete(&self, authorized_app_id: &str) -> Result<()>;

    /// List live credentials, most recently created first
    async fn list(&self) -> Result<Vec<Credential>>;

    /// Release backend resources
    async fn close(&self) -> Result<()>;
}

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Create a storage backend from configuration
pub async fn create_storage_from_config(
    config: &crate::config::StorageConfig,
) -> crate::Result<Arc<dyn CredentialStore>> {
    match config.driver.as_str() {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        "sqlite" => Ok(Arc::new(SqliteStorage::new(&config.dsn).await?)),
        _ => Err(crate::StorelinkError::config(format!(
            "Unknown storage driver: {}. Supported: memory, sqlite",
            config.driver
        ))),
    }
}
