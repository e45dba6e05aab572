//! In-memory storage implementation
//!
//! Fast, non-persistent storage for development and testing.
//! Uses DashMap for concurrent access without a global lock.
//!
//! **WARNING:** MemoryStorage is NOT recommended for production use:
//! data is lost on process restart and is not shared between instances.
//! For production deployments, use SqliteStorage.

use super::*;
use crate::StorelinkError;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory credential store
#[derive(Clone)]
pub struct MemoryStorage {
    credentials: Arc<DashMap<String, Credential>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            credentials: Arc::new(DashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStorage {
    async fn get(&self, authorized_app_id: &str) -> Result<Option<Credential>> {
        Ok(self
            .credentials
            .get(authorized_app_id)
            .filter(|c| !c.deleted)
            .map(|c| c.clone()))
    }

    async fn insert(&self, credential: &Credential) -> Result<Credential> {
        credential.validate()?;

        // The entry guard holds the shard lock, so check-and-insert is atomic
        match self.credentials.entry(credential.authorized_app_id.clone()) {
            Entry::Occupied(existing) if !existing.get().deleted => Ok(existing.get().clone()),
            Entry::Occupied(mut existing) => {
                existing.insert(credential.clone());
                Ok(credential.clone())
            }
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
                Ok(credential.clone())
            }
        }
    }

    async fn replace(&self, credential: &Credential) -> Result<Credential> {
        credential.validate()?;
        self.credentials
            .insert(credential.authorized_app_id.clone(), credential.clone());
        Ok(credential.clone())
    }

    async fn replace_if_current(
        &self,
        credential: &Credential,
        expected_refresh_token: &str,
    ) -> Result<Option<Credential>> {
        credential.validate()?;

        // Compare and write under the same shard lock
        match self.credentials.get_mut(&credential.authorized_app_id) {
            Some(mut current)
                if !current.deleted && current.refresh_token == expected_refresh_token =>
            {
                *current = credential.clone();
                Ok(Some(credential.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn soft_delete(&self, authorized_app_id: &str) -> Result<()> {
        match self.credentials.get_mut(authorized_app_id) {
            Some(mut cred) if !cred.deleted => {
                cred.deleted = true;
                cred.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(StorelinkError::CredentialNotFound(
                authorized_app_id.to_string(),
            )),
        }
    }

    async fn list(&self) -> Result<Vec<Credential>> {
        let mut creds: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| !c.deleted)
            .map(|c| c.value().clone())
            .collect();
        // Sort by created_at descending (most recent first)
        creds.sort_unstable_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(creds)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
