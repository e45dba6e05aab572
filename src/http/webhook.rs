//! Webhook intake
//!
//! Deliveries are authenticated before anything in them is trusted. The HMAC is
//! recomputed over the bytes exactly as they arrived, never over a re-serialized
//! form, then accepted envelopes are routed by scope.

use super::{AppError, AppState};
use crate::config::{SignatureBasis, WebhookConfig};
use crate::storage::CredentialStore;
use crate::{Result, StorelinkError, auth, telemetry};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Value, json};

/// Create webhook routes
pub fn create_webhook_routes() -> Router<AppState> {
    Router::new().route("/api/webhook/ikas", post(handle_webhook))
}

/// One webhook delivery
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub id: String,
    pub scope: String,
    pub merchant_id: String,
    pub authorized_app_id: String,
    pub created_at: Value,
    /// Payload kept as the exact JSON text received
    pub data: Box<RawValue>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl WebhookEnvelope {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("id", &self.id),
            ("scope", &self.scope),
            ("merchantId", &self.merchant_id),
            ("authorizedAppId", &self.authorized_app_id),
        ] {
            if value.is_empty() {
                return Err(StorelinkError::validation(format!("{} is required", name)));
            }
        }
        if self.created_at.is_null() {
            return Err(StorelinkError::validation("createdAt is required"));
        }
        Ok(())
    }

    /// Bytes covered by the signature when the `data` field is signed
    ///
    /// A string payload is signed over its decoded contents, anything else over
    /// the raw JSON text.
    pub fn data_signing_bytes(&self) -> Result<Vec<u8>> {
        let raw = self.data.get();
        if raw.starts_with('"') {
            let decoded: String = serde_json::from_str(raw)?;
            Ok(decoded.into_bytes())
        } else {
            Ok(raw.as_bytes().to_vec())
        }
    }
}

/// Verifies deliveries and decides what they mean
pub struct WebhookVerifier {
    secret: String,
    basis: SignatureBasis,
    uninstall_scopes: Vec<String>,
}

impl WebhookVerifier {
    pub fn new(secret: &str, config: &WebhookConfig) -> Self {
        Self {
            secret: secret.to_string(),
            basis: config.signature_basis.clone(),
            uninstall_scopes: config.uninstall_scopes.clone(),
        }
    }

    /// Parse and authenticate a delivery
    ///
    /// Schema problems are `Validation` errors, a bad signature is `SignatureInvalid`.
    pub fn authenticate(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEnvelope> {
        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| StorelinkError::validation(format!("Invalid webhook envelope: {}", e)))?;
        envelope.validate()?;

        let valid = match &self.basis {
            SignatureBasis::Data => {
                let signature = envelope
                    .signature
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| StorelinkError::validation("signature is required"))?;
                auth::verify(&envelope.data_signing_bytes()?, signature, &self.secret)
            }
            SignatureBasis::RawBody { header } => {
                let signature = headers
                    .get(header.as_str())
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        StorelinkError::validation(format!("{} header is required", header))
                    })?;
                auth::verify(body, signature, &self.secret)
            }
        };

        if !valid {
            return Err(StorelinkError::SignatureInvalid);
        }
        Ok(envelope)
    }

    pub fn is_uninstall(&self, scope: &str) -> bool {
        self.uninstall_scopes.iter().any(|s| s == scope)
    }
}

/// Act on an authenticated delivery
pub async fn dispatch(
    verifier: &WebhookVerifier,
    store: &dyn CredentialStore,
    envelope: &WebhookEnvelope,
) -> Result<()> {
    if verifier.is_uninstall(&envelope.scope) {
        match store.soft_delete(&envelope.authorized_app_id).await {
            Ok(()) => tracing::info!(
                authorized_app_id = %envelope.authorized_app_id,
                merchant_id = %envelope.merchant_id,
                "Credential revoked by uninstall webhook"
            ),
            Err(StorelinkError::CredentialNotFound(_)) => tracing::debug!(
                authorized_app_id = %envelope.authorized_app_id,
                "Uninstall webhook for unknown credential"
            ),
            Err(e) => return Err(e),
        }
        return Ok(());
    }

    tracing::info!(
        webhook_id = %envelope.id,
        scope = %envelope.scope,
        merchant_id = %envelope.merchant_id,
        "Received webhook"
    );
    Ok(())
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, AppError> {
    let envelope = match state.webhooks.authenticate(&headers, &body) {
        Ok(envelope) => envelope,
        Err(e) => {
            let result = match e {
                StorelinkError::SignatureInvalid => "rejected",
                _ => "invalid",
            };
            telemetry::record_webhook("unknown", result);
            tracing::warn!("Webhook refused: {}", e);
            return Err(e.into());
        }
    };

    telemetry::record_webhook(&envelope.scope, "accepted");
    dispatch(&state.webhooks, state.store.as_ref(), &envelope).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Webhook processed successfully",
    }))
    .into_response())
}
