//! Core data structures for Storelink
//!
//! This module contains the records exchanged between the credential store,
//! the remote OAuth provider and the authorization flow.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credential for one authorized app (one installation for one merchant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Unique key, stable across token rotations
    pub authorized_app_id: String,

    /// Owning merchant (tenant)
    pub merchant_id: String,

    /// Bearer token presented to the remote API
    pub access_token: String,

    /// Token used to obtain the next access token
    pub refresh_token: String,

    /// Token type (e.g., "Bearer")
    pub token_type: String,

    /// Granted capabilities as issued by the provider
    #[serde(default)]
    pub scope: String,

    /// Lifetime in seconds of the most recently issued access token
    pub expires_in: i64,

    /// Absolute expiry of the access token
    pub expire_date: DateTime<Utc>,

    /// Optional sales channel sub-scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_channel_id: Option<String>,

    /// Soft-delete flag
    #[serde(default)]
    pub deleted: bool,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

// Validation macro for required fields
macro_rules! require_field {
    ($field:expr, $name:literal) => {
        if $field.is_empty() {
            return Err(crate::StorelinkError::validation(concat!(
                $name,
                " is required"
            )));
        }
    };
}

impl Credential {
    /// Build a credential from a fresh token grant and the identity it belongs to
    pub fn from_grant(grant: &TokenGrant, identity: &RemoteIdentity, now: DateTime<Utc>) -> Self {
        Self {
            authorized_app_id: identity.authorized_app_id.clone(),
            merchant_id: identity.merchant_id.clone(),
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone().unwrap_or_default(),
            token_type: grant.token_type.clone(),
            scope: grant.scope.clone().unwrap_or_default(),
            expires_in: grant.expires_in,
            expire_date: grant.expire_date_from(now),
            sales_channel_id: identity.sales_channel_id.clone(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate the credential before it is persisted
    pub fn validate(&self) -> crate::Result<()> {
        require_field!(self.authorized_app_id, "authorizedAppId");
        require_field!(self.merchant_id, "merchantId");
        require_field!(self.access_token, "accessToken");
        Ok(())
    }

    /// Check if the access token is expired at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_date
    }

    /// Check if the access token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Apply a rotated token grant in place
    ///
    /// The refresh token is only replaced when the provider issued a new one.
    pub fn apply_grant(&mut self, grant: &TokenGrant, now: DateTime<Utc>) {
        self.access_token = grant.access_token.clone();
        if let Some(ref refresh) = grant.refresh_token {
            self.refresh_token = refresh.clone();
        }
        self.token_type = grant.token_type.clone();
        if let Some(ref scope) = grant.scope {
            self.scope = scope.clone();
        }
        self.expires_in = grant.expires_in;
        self.expire_date = grant.expire_date_from(now);
        self.updated_at = now;
    }
}

/// Token material returned by the provider's token endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Absolute expiry of this grant when issued at `now`
    #[must_use]
    pub fn expire_date_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.expires_in)
    }
}

/// Identity of the installation a freshly issued token belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIdentity {
    pub merchant_id: String,
    pub store_name: String,
    pub authorized_app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_channel_id: Option<String>,
}
