//! Expiry-aware token refresh
//!
//! `ensure_fresh` hands out the stored access token while it is valid and
//! refreshes it once it has expired. Refreshes for the same authorized app are
//! serialized through a per-key async mutex: callers that queue behind a refresh
//! re-read the credential and reuse the rotated token instead of spending the
//! refresh token a second time.
//!
//! The guarantee is process-local. Several instances sharing one store each keep
//! their own lock table.

use crate::auth::provider::OAuthProvider;
use crate::model::Credential;
use crate::storage::CredentialStore;
use crate::{Result, StorelinkError, telemetry};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Coordinates token refreshes so at most one is in flight per credential
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn OAuthProvider>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn OAuthProvider>) -> Self {
        Self {
            store,
            provider,
            locks: DashMap::new(),
        }
    }

    /// Return a valid access token for the authorized app, refreshing if expired
    pub async fn ensure_fresh(&self, authorized_app_id: &str) -> Result<String> {
        let credential = self.load(authorized_app_id).await?;

        // Fast path: no lock and no I/O while the token is valid
        if !credential.is_expired_at(Utc::now()) {
            return Ok(credential.access_token);
        }

        let credential = self.refresh_locked(authorized_app_id, false).await?;
        Ok(credential.access_token)
    }

    /// Refresh regardless of expiry, under the same per-key lock
    pub async fn refresh_now(&self, authorized_app_id: &str) -> Result<Credential> {
        self.refresh_locked(authorized_app_id, true).await
    }

    /// Number of keys with a live lock entry
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    async fn load(&self, authorized_app_id: &str) -> Result<Credential> {
        self.store
            .get(authorized_app_id)
            .await?
            .ok_or_else(|| StorelinkError::CredentialNotFound(authorized_app_id.to_string()))
    }

    fn lock_for(&self, authorized_app_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(authorized_app_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no caller holds or waits on it
    fn prune(&self, authorized_app_id: &str) {
        self.locks
            .remove_if(authorized_app_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn refresh_locked(&self, authorized_app_id: &str, force: bool) -> Result<Credential> {
        let lock = self.lock_for(authorized_app_id);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_under_guard(authorized_app_id, force).await
        };
        drop(lock);
        self.prune(authorized_app_id);
        result
    }

    async fn refresh_under_guard(&self, authorized_app_id: &str, force: bool) -> Result<Credential> {
        // Re-read: a caller ahead of us may already have rotated the token
        let mut credential = self.load(authorized_app_id).await?;
        if !force && !credential.is_expired_at(Utc::now()) {
            tracing::debug!(authorized_app_id, "Token already refreshed by another caller");
            telemetry::record_refresh("coalesced");
            return Ok(credential);
        }

        if credential.refresh_token.is_empty() {
            telemetry::record_refresh("failed");
            return Err(StorelinkError::refresh(
                authorized_app_id,
                "no refresh token stored",
            ));
        }

        tracing::info!(authorized_app_id, "Refreshing access token");

        let grant = match self.provider.refresh(&credential.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(authorized_app_id, error = %e, "Token refresh failed");
                telemetry::record_refresh("failed");
                return Err(StorelinkError::refresh(authorized_app_id, e.to_string()));
            }
        };

        // Uninstall and re-authorization write without this lock, so only
        // commit if the record is still the one the grant was issued for
        let spent_refresh_token = credential.refresh_token.clone();
        credential.apply_grant(&grant, Utc::now());
        let Some(stored) = self
            .store
            .replace_if_current(&credential, &spent_refresh_token)
            .await?
        else {
            telemetry::record_refresh("superseded");
            return match self.store.get(authorized_app_id).await? {
                Some(current) => {
                    tracing::info!(
                        authorized_app_id,
                        "Credential re-authorized during refresh, keeping the newer record"
                    );
                    Ok(current)
                }
                None => {
                    tracing::info!(authorized_app_id, "Credential removed during refresh");
                    Err(StorelinkError::CredentialNotFound(
                        authorized_app_id.to_string(),
                    ))
                }
            };
        };

        telemetry::record_refresh("refreshed");
        tracing::info!(
            authorized_app_id,
            expire_date = %stored.expire_date,
            "Access token refreshed"
        );

        Ok(stored)
    }
}
