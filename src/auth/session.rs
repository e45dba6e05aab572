//! Sealed cookie sessions and CSRF state handling
//!
//! Sessions live entirely in the client cookie. The cookie value is the session
//! serialized to JSON and sealed with AES-256-GCM, so the client can neither read
//! nor forge it. The authorization `state` rides in the session and is consumed
//! exactly once by the callback.

use crate::constants::MIN_SESSION_PASSWORD_LEN;
use crate::{Result, StorelinkError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const NONCE_LEN: usize = 12;

/// Data carried in the sealed session cookie
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Pending authorization state, present only during a handshake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Expiry of the pending state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_expires_at: Option<DateTime<Utc>>,

    /// Store the handshake was started for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_app_id: Option<String>,

    /// Application-level session expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionData {
    /// Whether the session carries a live merchant identity at `now`
    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.merchant_id.is_some()
            && self.authorized_app_id.is_some()
            && self.expires_at.is_some_and(|exp| now < exp)
    }

    /// Record the identity established by a successful callback
    pub fn authenticate(
        &mut self,
        merchant_id: &str,
        authorized_app_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        self.merchant_id = Some(merchant_id.to_string());
        self.authorized_app_id = Some(authorized_app_id.to_string());
        self.expires_at = Some(now + ttl);
    }
}

/// Envelope encrypted into the cookie; `exp` bounds the cookie itself
#[derive(Serialize, Deserialize)]
struct SealedEnvelope {
    exp: i64,
    data: SessionData,
}

/// Seals and unseals session cookies with a key derived from the server password
#[derive(Clone)]
pub struct SessionSealer {
    cipher: Aes256Gcm,
    ttl: Duration,
}

impl SessionSealer {
    /// Create a sealer from the configured password
    ///
    /// The password must be at least 32 characters; the AES key is its SHA-256.
    pub fn new(password: &str, ttl_secs: i64) -> Result<Self> {
        if password.len() < MIN_SESSION_PASSWORD_LEN {
            return Err(StorelinkError::config(format!(
                "session password must be at least {} characters",
                MIN_SESSION_PASSWORD_LEN
            )));
        }

        let key = Sha256::digest(password.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| StorelinkError::config(format!("Invalid session key: {}", e)))?;

        Ok(Self {
            cipher,
            ttl: Duration::seconds(ttl_secs),
        })
    }

    /// Cookie lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Seal a session into a cookie value
    pub fn seal(&self, session: &SessionData) -> Result<String> {
        self.seal_at(session, Utc::now())
    }

    pub fn seal_at(&self, session: &SessionData, now: DateTime<Utc>) -> Result<String> {
        let envelope = SealedEnvelope {
            exp: (now + self.ttl).timestamp(),
            data: session.clone(),
        };
        let plaintext = serde_json::to_vec(&envelope)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
            .map_err(|_| StorelinkError::SessionDecode("failed to seal session".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Unseal a cookie value
    ///
    /// Tampered, truncated, foreign-key or expired values are `SessionDecode` errors.
    pub fn unseal(&self, value: &str) -> Result<SessionData> {
        self.unseal_at(value, Utc::now())
    }

    pub fn unseal_at(&self, value: &str, now: DateTime<Utc>) -> Result<SessionData> {
        let sealed = URL_SAFE_NO_PAD
            .decode(value.trim())
            .map_err(|e| StorelinkError::SessionDecode(format!("invalid encoding: {}", e)))?;

        if sealed.len() <= NONCE_LEN {
            return Err(StorelinkError::SessionDecode("sealed value too short".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorelinkError::SessionDecode("authentication failed".to_string()))?;

        let envelope: SealedEnvelope = serde_json::from_slice(&plaintext)
            .map_err(|e| StorelinkError::SessionDecode(format!("invalid payload: {}", e)))?;

        if now.timestamp() >= envelope.exp {
            return Err(StorelinkError::SessionDecode("session expired".to_string()));
        }

        Ok(envelope.data)
    }
}

/// Issues and consumes single-use authorization state values
#[derive(Debug, Clone)]
pub struct StateGuard {
    state_ttl: Duration,
}

impl StateGuard {
    pub fn new(state_ttl_secs: i64) -> Self {
        Self {
            state_ttl: Duration::seconds(state_ttl_secs),
        }
    }

    /// Begin a handshake: fresh state, store hint, short session expiry
    ///
    /// Any identity from an earlier handshake is dropped.
    pub fn start_authorization(&self, session: &mut SessionData, store_name: &str) -> String {
        let now = Utc::now();
        let state = self.issue_state(session, now);
        session.store_name = Some(store_name.to_string());
        session.merchant_id = None;
        session.authorized_app_id = None;
        session.expires_at = Some(now + self.state_ttl);
        state
    }

    /// Put a fresh state into an existing session without touching its identity
    pub fn issue_state(&self, session: &mut SessionData, now: DateTime<Utc>) -> String {
        let state = generate_state();
        session.state = Some(state.clone());
        session.state_expires_at = Some(now + self.state_ttl);
        state
    }

    /// Check the echoed state against the session and consume it
    ///
    /// The stored state is cleared on every attempt, so a second callback with the
    /// same value fails.
    pub fn consume_callback(&self, session: &mut SessionData, state: &str) -> Result<()> {
        self.consume_callback_at(session, state, Utc::now())
    }

    pub fn consume_callback_at(
        &self,
        session: &mut SessionData,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let stored = session.state.take();
        let expires_at = session.state_expires_at.take();

        let Some(stored) = stored else {
            return Err(StorelinkError::CsrfMismatch);
        };
        if state.is_empty() || expires_at.is_none_or(|exp| now >= exp) {
            return Err(StorelinkError::CsrfMismatch);
        }
        if !bool::from(stored.as_bytes().ct_eq(state.as_bytes())) {
            return Err(StorelinkError::CsrfMismatch);
        }

        Ok(())
    }
}

/// Generate a random state value (32 bytes, base64url)
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
