//! Error types for Storelink
//!
//! This module provides the error hierarchy using thiserror.
//! All errors can be converted to StorelinkError for unified error handling.

use thiserror::Error;

/// Main error type for Storelink operations
#[derive(Error, Debug)]
pub enum StorelinkError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("State parameter missing or does not match the session")]
    CsrfMismatch,

    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Unable to retrieve merchant or authorized app: {0}")]
    IdentityUnavailable(String),

    #[error("Token refresh failed for {authorized_app_id}: {message}")]
    RefreshFailed {
        authorized_app_id: String,
        message: String,
    },

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Session decode error: {0}")]
    SessionDecode(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for StorelinkError {
    fn from(err: sqlx::Error) -> Self {
        StorelinkError::Storage(StorageError::from(err))
    }
}

impl From<sqlx::migrate::MigrateError> for StorelinkError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorelinkError::Storage(StorageError::Database(format!("Migration failed: {}", err)))
    }
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl From<reqwest::Error> for StorelinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorelinkError::Network(NetworkError::Timeout)
        } else {
            StorelinkError::Network(NetworkError::Reqwest(err))
        }
    }
}

impl From<url::ParseError> for StorelinkError {
    fn from(err: url::ParseError) -> Self {
        StorelinkError::Network(NetworkError::InvalidUrl(err.to_string()))
    }
}

impl From<jsonwebtoken::errors::Error> for StorelinkError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        StorelinkError::Unauthorized(err.to_string())
    }
}

/// Convenient result type for Storelink operations
pub type Result<T> = std::result::Result<T, StorelinkError>;

impl StorelinkError {
    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        StorelinkError::Validation(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        StorelinkError::Config(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        StorelinkError::Storage(StorageError::Database(msg.into()))
    }

    /// Create an exchange error
    #[inline]
    pub fn exchange<S: Into<String>>(msg: S) -> Self {
        StorelinkError::ExchangeFailed(msg.into())
    }

    /// Create a refresh error for one authorized app
    #[inline]
    pub fn refresh<A: Into<String>, M: Into<String>>(authorized_app_id: A, message: M) -> Self {
        StorelinkError::RefreshFailed {
            authorized_app_id: authorized_app_id.into(),
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    #[inline]
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        StorelinkError::Unauthorized(msg.into())
    }
}
