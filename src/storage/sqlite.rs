//! SQLite storage implementation
//!
//! Provides persistent credential storage using SQLite.

use super::*;
use crate::StorelinkError;
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::path::Path;

const CREDENTIAL_COLUMNS: &str = "authorized_app_id, merchant_id, access_token, refresh_token, \
     token_type, scope, expires_in, expire_date, sales_channel_id, deleted, created_at, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    pub(super) pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    ///
    /// # Arguments
    /// * `dsn` - Database path (e.g., ".storelink/credentials.db" or ":memory:" for in-memory)
    pub async fn new(dsn: &str) -> Result<Self> {
        // Prepend sqlite: prefix if not present and add create-if-missing option
        let connection_string = if dsn.starts_with("sqlite:") {
            if dsn.contains('?') {
                dsn.to_string()
            } else {
                format!("{}?mode=rwc", dsn)
            }
        } else {
            format!("sqlite:{}?mode=rwc", dsn)
        };

        // Extract actual file path for directory creation
        let file_path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);

        if file_path.contains("..") {
            return Err(StorelinkError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        // Create parent directory if needed (unless it's :memory:)
        if file_path != ":memory:"
            && let Some(parent) = Path::new(file_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // An in-memory database exists per connection, so keep exactly one
        let max_connections = if file_path == ":memory:" { 1 } else { 5 };
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_string)
            .await
            .map_err(|e| {
                StorelinkError::Storage(StorageError::Connection(format!(
                    "Failed to connect to SQLite: {}",
                    e
                )))
            })?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .map_err(|e| StorelinkError::storage(format!("Failed to run migrations: {}", e)))?;

        Ok(Self { pool })
    }

    fn parse_credential(row: &SqliteRow) -> Result<Credential> {
        Ok(Credential {
            authorized_app_id: row.try_get("authorized_app_id")?,
            merchant_id: row.try_get("merchant_id")?,
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            token_type: row.try_get("token_type")?,
            scope: row.try_get("scope")?,
            expires_in: row.try_get("expires_in")?,
            expire_date: from_millis("expire_date", row.try_get("expire_date")?)?,
            sales_channel_id: row.try_get("sales_channel_id")?,
            deleted: row.try_get::<i64, _>("deleted")? != 0,
            created_at: from_millis("created_at", row.try_get("created_at")?)?,
            updated_at: from_millis("updated_at", row.try_get("updated_at")?)?,
        })
    }

    async fn fetch_live(&self, authorized_app_id: &str) -> Result<Option<Credential>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM credentials WHERE authorized_app_id = ? AND deleted = 0",
            CREDENTIAL_COLUMNS
        ))
        .bind(authorized_app_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_credential).transpose()
    }
}

// Timestamps are stored as unix milliseconds so expiry survives a round trip
fn from_millis(column: &str, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        StorelinkError::storage(format!("{} out of range: {} ms", column, ms))
    })
}

#[async_trait]
impl CredentialStore for SqliteStorage {
    async fn get(&self, authorized_app_id: &str) -> Result<Option<Credential>> {
        self.fetch_live(authorized_app_id).await
    }

    async fn insert(&self, credential: &Credential) -> Result<Credential> {
        credential.validate()?;

        // Only a soft-deleted row may be overwritten; a live row wins
        sqlx::query(&format!(
            "INSERT INTO credentials ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(authorized_app_id) DO UPDATE SET
                merchant_id = excluded.merchant_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                scope = excluded.scope,
                expires_in = excluded.expires_in,
                expire_date = excluded.expire_date,
                sales_channel_id = excluded.sales_channel_id,
                deleted = excluded.deleted,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
             WHERE credentials.deleted = 1",
            CREDENTIAL_COLUMNS
        ))
        .bind(&credential.authorized_app_id)
        .bind(&credential.merchant_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(&credential.token_type)
        .bind(&credential.scope)
        .bind(credential.expires_in)
        .bind(credential.expire_date.timestamp_millis())
        .bind(&credential.sales_channel_id)
        .bind(credential.deleted as i64)
        .bind(credential.created_at.timestamp_millis())
        .bind(credential.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.fetch_live(&credential.authorized_app_id)
            .await?
            .ok_or_else(|| StorelinkError::CredentialNotFound(credential.authorized_app_id.clone()))
    }

    async fn replace(&self, credential: &Credential) -> Result<Credential> {
        credential.validate()?;

        sqlx::query(&format!(
            "INSERT OR REPLACE INTO credentials ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            CREDENTIAL_COLUMNS
        ))
        .bind(&credential.authorized_app_id)
        .bind(&credential.merchant_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(&credential.token_type)
        .bind(&credential.scope)
        .bind(credential.expires_in)
        .bind(credential.expire_date.timestamp_millis())
        .bind(&credential.sales_channel_id)
        .bind(credential.deleted as i64)
        .bind(credential.created_at.timestamp_millis())
        .bind(credential.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(credential.clone())
    }

    async fn replace_if_current(
        &self,
        credential: &Credential,
        expected_refresh_token: &str,
    ) -> Result<Option<Credential>> {
        credential.validate()?;

        let result = sqlx::query(
            "UPDATE credentials SET
                merchant_id = ?, access_token = ?, refresh_token = ?, token_type = ?,
                scope = ?, expires_in = ?, expire_date = ?, sales_channel_id = ?,
                updated_at = ?
             WHERE authorized_app_id = ? AND refresh_token = ? AND deleted = 0",
        )
        .bind(&credential.merchant_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(&credential.token_type)
        .bind(&credential.scope)
        .bind(credential.expires_in)
        .bind(credential.expire_date.timestamp_millis())
        .bind(&credential.sales_channel_id)
        .bind(credential.updated_at.timestamp_millis())
        .bind(&credential.authorized_app_id)
        .bind(expected_refresh_token)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_live(&credential.authorized_app_id).await
    }

    async fn soft_delete(&self, authorized_app_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE credentials SET deleted = 1, updated_at = ?
             WHERE authorized_app_id = ? AND deleted = 0",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(authorized_app_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorelinkError::CredentialNotFound(
                authorized_app_id.to_string(),
            ));
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Credential>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM credentials WHERE deleted = 0 ORDER BY created_at DESC",
            CREDENTIAL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_credential).collect()
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
