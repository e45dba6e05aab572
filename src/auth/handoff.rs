//! Handoff tokens
//!
//! After a successful callback (or a verified signed launch) the app hands the
//! frontend a short-lived HS256 JWT identifying the merchant and authorized app.
//! API routes authenticate with it through the `AuthenticatedMerchant` extractor.

use crate::constants::HANDOFF_TOKEN_TTL_SECS;
use crate::http::AppError;
use crate::{Result, StorelinkError};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by a handoff token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffClaims {
    /// Merchant id
    pub sub: String,
    /// Authorized app id
    pub aud: String,
    pub iss: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and verifies handoff tokens keyed by the OAuth client secret
#[derive(Clone)]
pub struct HandoffTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl HandoffTokens {
    pub fn new(secret: &str, issuer: &str) -> Self {
        Self::with_ttl(secret, issuer, HANDOFF_TOKEN_TTL_SECS)
    }

    pub fn with_ttl(secret: &str, issuer: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Mint a token for a merchant's authorized app
    pub fn mint(&self, merchant_id: &str, authorized_app_id: &str) -> Result<String> {
        let now = Utc::now();
        let claims = HandoffClaims {
            sub: merchant_id.to_string(),
            aud: authorized_app_id.to_string(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Verify signature, issuer and expiry and return the claims
    pub fn verify(&self, token: &str) -> Result<HandoffClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        // The audience is the authorized app itself, not a fixed value
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<HandoffClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

/// Merchant identity proven by a handoff token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedMerchant {
    pub merchant_id: String,
    pub authorized_app_id: String,
}

/// Read the token from `Authorization: JWT <token>` or `Authorization: Bearer <token>`
fn token_from_parts(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("jwt") || scheme.eq_ignore_ascii_case("bearer") {
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    } else {
        None
    }
}

impl<S> FromRequestParts<S> for AuthenticatedMerchant
where
    HandoffTokens: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = std::result::Result<Self, Self::Rejection>> + Send {
        let tokens = HandoffTokens::from_ref(state);
        let token = token_from_parts(parts);

        async move {
            let token = token
                .ok_or_else(|| StorelinkError::unauthorized("missing authorization token"))?;
            let claims = tokens.verify(&token)?;
            Ok(AuthenticatedMerchant {
                merchant_id: claims.sub,
                authorized_app_id: claims.aud,
            })
        }
    }
}
