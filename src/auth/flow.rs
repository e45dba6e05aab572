//! Authorization flow
//!
//! Drives the install handshake: redirect to the provider, validate the callback
//! against the session state, exchange the code, resolve the installation identity
//! and persist the credential. Nothing is written to the store unless every step
//! before the write succeeded.

use crate::auth::handoff::{AuthenticatedMerchant, HandoffTokens};
use crate::auth::provider::OAuthProvider;
use crate::auth::session::{SessionData, StateGuard};
use crate::auth::signature::SignedLaunch;
use crate::config::{Config, OAuthConfig};
use crate::constants::CALLBACK_LANDING_PATH;
use crate::model::Credential;
use crate::storage::CredentialStore;
use crate::{Result, StorelinkError, telemetry};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Settings the flow needs from configuration
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub oauth: OAuthConfig,
    pub redirect_uri: String,
    pub session_ttl: Duration,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            oauth: config.oauth.clone(),
            redirect_uri: config.oauth.redirect_uri(&config.http),
            session_ttl: Duration::seconds(config.session.ttl_secs),
        }
    }
}

/// Result of a successful callback
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub credential: Credential,
    /// Handoff token for the frontend
    pub token: String,
    /// Admin panel page of the authorized app
    pub redirect_url: String,
}

impl CallbackOutcome {
    /// App landing path carrying the handoff token and admin redirect
    pub fn landing_path(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("token", &self.token)
            .append_pair("redirectUrl", &self.redirect_url)
            .append_pair("authorizedAppId", &self.credential.authorized_app_id)
            .finish();
        format!("{}?{}", CALLBACK_LANDING_PATH, query)
    }
}

/// Parameters the frontend needs to restart authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeData {
    pub state: String,
    pub scope: String,
    pub redirect_uri: String,
}

/// Whether the stored grant still covers the configured scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReauthorizeCheck {
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_data: Option<AuthorizeData>,
}

/// Authorization flow controller
pub struct AuthorizationFlow {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn OAuthProvider>,
    state_guard: StateGuard,
    handoff: HandoffTokens,
    settings: FlowSettings,
}

impl AuthorizationFlow {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn OAuthProvider>,
        state_guard: StateGuard,
        handoff: HandoffTokens,
        settings: FlowSettings,
    ) -> Self {
        Self {
            store,
            provider,
            state_guard,
            handoff,
            settings,
        }
    }

    /// Begin authorization for a store and return the provider redirect URL
    pub fn start(&self, session: &mut SessionData, store_name: &str) -> Result<String> {
        validate_store_name(store_name)?;

        let state = self.state_guard.start_authorization(session, store_name);
        let url = self.provider.authorize_url(store_name, &state)?;

        tracing::info!(store_name, "Authorization started");
        Ok(url)
    }

    /// Complete the callback: validate state, exchange the code, persist the credential
    pub async fn complete_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        session: &mut SessionData,
    ) -> Result<CallbackOutcome> {
        let result = self.run_callback(code, state, session).await;
        telemetry::record_callback(match &result {
            Ok(_) => "success",
            Err(StorelinkError::CsrfMismatch) => "csrf_mismatch",
            Err(StorelinkError::Validation(_)) => "invalid_request",
            Err(StorelinkError::ExchangeFailed(_)) => "exchange_failed",
            Err(StorelinkError::IdentityUnavailable(_)) => "identity_unavailable",
            Err(_) => "error",
        });
        result
    }

    async fn run_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        session: &mut SessionData,
    ) -> Result<CallbackOutcome> {
        // State first: it is consumed even when the rest of the request is invalid
        self.state_guard
            .consume_callback(session, state.unwrap_or_default())
            .inspect_err(|_| tracing::warn!("Callback state did not match the session"))?;

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StorelinkError::validation("code is required"))?;

        let grant = self.provider.exchange_code(code).await?;
        let identity = self.provider.fetch_identity(&grant.access_token).await?;

        let now = Utc::now();
        let credential = Credential::from_grant(&grant, &identity, now);
        let credential = self.store.replace(&credential).await?;

        session.authenticate(
            &credential.merchant_id,
            &credential.authorized_app_id,
            self.settings.session_ttl,
            now,
        );

        let token = self
            .handoff
            .mint(&credential.merchant_id, &credential.authorized_app_id)?;

        let store_name = if identity.store_name.is_empty() {
            session.store_name.clone().unwrap_or_default()
        } else {
            identity.store_name.clone()
        };
        let redirect_url = format!(
            "{}/authorized-app/{}",
            self.settings.oauth.admin_url_for(&store_name),
            credential.authorized_app_id
        );

        tracing::info!(
            authorized_app_id = %credential.authorized_app_id,
            merchant_id = %credential.merchant_id,
            "Authorization completed"
        );

        Ok(CallbackOutcome {
            credential,
            token,
            redirect_url,
        })
    }

    /// Compare the stored grant's scope with the configured scope
    ///
    /// When they differ a fresh state is put into the session so the frontend can
    /// send the merchant through authorization again.
    pub async fn check_reauthorize(
        &self,
        merchant: &AuthenticatedMerchant,
        session: &mut SessionData,
    ) -> Result<ReauthorizeCheck> {
        let credential = self
            .store
            .get(&merchant.authorized_app_id)
            .await?
            .ok_or_else(|| StorelinkError::CredentialNotFound(merchant.authorized_app_id.clone()))?;

        if scope_set(&credential.scope) == scope_set(&self.settings.oauth.scope) {
            return Ok(ReauthorizeCheck {
                required: false,
                authorize_data: None,
            });
        }

        let state = self.state_guard.issue_state(session, Utc::now());
        Ok(ReauthorizeCheck {
            required: true,
            authorize_data: Some(AuthorizeData {
                state,
                scope: self.settings.oauth.scope.clone(),
                redirect_uri: self.settings.redirect_uri.clone(),
            }),
        })
    }

    /// Trade a signed launch from the merchant admin for a handoff token
    pub fn exchange_signed_launch(&self, launch: &SignedLaunch) -> Result<String> {
        launch.verify(&self.settings.oauth.client_secret)?;
        self.handoff
            .mint(&launch.merchant_id, &launch.authorized_app_id)
    }
}

/// Store names are used as a host label, so only letters, digits and dashes pass
fn validate_store_name(store_name: &str) -> Result<()> {
    if store_name.is_empty() {
        return Err(StorelinkError::validation("storeName is required"));
    }
    if !store_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(StorelinkError::validation(
            "storeName may contain only letters, digits and dashes",
        ));
    }
    Ok(())
}

/// Scopes compared as a set; the platform separates them with commas or spaces
fn scope_set(scope: &str) -> BTreeSet<&str> {
    scope
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
