//! HMAC-SHA256 request signatures
//!
//! Signs and verifies webhook payloads and signed launch parameters. Verification
//! always recomputes the MAC over the exact bytes received and compares in
//! constant time.

use crate::constants::SIGNED_LAUNCH_MAX_AGE_MS;
use crate::{Result, StorelinkError};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    }
}

/// Compute the lowercase hex HMAC-SHA256 of `payload`
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature over `payload`
///
/// Malformed or wrong-length signatures are rejected, never reported as errors.
#[must_use]
pub fn verify(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let mut mac = mac_for(secret);
    mac.update(payload);
    // verify_slice compares in constant time and rejects length mismatches
    mac.verify_slice(&provided).is_ok()
}

/// Signed launch parameters sent by the merchant admin when it opens the app
///
/// Missing fields deserialize as empty strings so `verify` can report them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignedLaunch {
    pub authorized_app_id: String,
    pub merchant_id: String,
    pub store_name: String,
    /// Milliseconds since the unix epoch; accepted as a string or a number
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    pub signature: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "timestamp must be a string or number, got {}",
            other
        ))),
    }
}

impl SignedLaunch {
    /// The exact byte sequence the signature covers
    pub fn signing_payload(&self) -> String {
        format!(
            "{}{}{}{}",
            self.authorized_app_id, self.merchant_id, self.store_name, self.timestamp
        )
    }

    /// Sign launch parameters (used by tests and the `sign` CLI command)
    pub fn signed(
        authorized_app_id: &str,
        merchant_id: &str,
        store_name: &str,
        timestamp_ms: i64,
        secret: &str,
    ) -> Self {
        let mut launch = Self {
            authorized_app_id: authorized_app_id.to_string(),
            merchant_id: merchant_id.to_string(),
            store_name: store_name.to_string(),
            timestamp: timestamp_ms.to_string(),
            signature: String::new(),
        };
        launch.signature = sign(launch.signing_payload().as_bytes(), secret);
        launch
    }

    /// Validate fields, freshness and signature
    pub fn verify(&self, secret: &str) -> Result<()> {
        self.verify_at(secret, Utc::now().timestamp_millis())
    }

    /// Validate against an explicit clock reading in milliseconds
    pub fn verify_at(&self, secret: &str, now_ms: i64) -> Result<()> {
        for (name, value) in [
            ("authorizedAppId", &self.authorized_app_id),
            ("merchantId", &self.merchant_id),
            ("storeName", &self.store_name),
            ("timestamp", &self.timestamp),
            ("signature", &self.signature),
        ] {
            if value.is_empty() {
                return Err(StorelinkError::validation(format!("{} is required", name)));
            }
        }

        let issued_ms: i64 = self
            .timestamp
            .parse()
            .map_err(|_| StorelinkError::validation("timestamp must be milliseconds since epoch"))?;

        if (now_ms - issued_ms).abs() > SIGNED_LAUNCH_MAX_AGE_MS {
            return Err(StorelinkError::unauthorized("signed launch has expired"));
        }

        if !verify(self.signing_payload().as_bytes(), &self.signature, secret) {
            return Err(StorelinkError::SignatureInvalid);
        }

        Ok(())
    }
}

#[cfg(test)]
mod signature_test {
    include!("signature_test.rs");
}
