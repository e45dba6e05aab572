//! HTTP server for Storelink
//!
//! Thin axum surface over the token lifecycle: authorization redirect and
//! callback, signed launch handoff, session checks, and webhook intake.

pub mod oauth;
pub mod session;
pub mod webhook;

use self::session::SessionCookies;
use self::webhook::WebhookVerifier;
use crate::auth::provider::build_http_client;
use crate::auth::{
    AuthorizationFlow, AuthorizedApiClient, FlowSettings, HandoffTokens, HttpOAuthProvider,
    OAuthProvider, RefreshCoordinator, StateGuard,
};
use crate::config::Config;
use crate::storage::{CredentialStore, create_storage_from_config};
use crate::{Result, StorelinkError};
use axum::{
    Router,
    extract::{FromRef, Json},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CredentialStore>,
    pub flow: Arc<AuthorizationFlow>,
    pub refresh: Arc<RefreshCoordinator>,
    pub api: AuthorizedApiClient,
    pub sessions: SessionCookies,
    pub handoff: HandoffTokens,
    pub webhooks: Arc<WebhookVerifier>,
}

impl AppState {
    /// Wire the components around an existing store and provider
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Result<Self> {
        let sessions = SessionCookies::new(&config)?;
        let handoff = HandoffTokens::new(&config.oauth.client_secret, &config.http.deploy_url);
        let flow = Arc::new(AuthorizationFlow::new(
            store.clone(),
            provider.clone(),
            StateGuard::new(config.session.state_ttl_secs),
            handoff.clone(),
            FlowSettings::from_config(&config),
        ));
        let refresh = Arc::new(RefreshCoordinator::new(store.clone(), provider));
        let api = AuthorizedApiClient::new(
            refresh.clone(),
            build_http_client(config.oauth.request_timeout_secs)?,
            config.oauth.graph_api_url.clone(),
        );
        let webhooks = Arc::new(WebhookVerifier::new(
            &config.oauth.client_secret,
            &config.webhook,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            flow,
            refresh,
            api,
            sessions,
            handoff,
            webhooks,
        })
    }

    /// Build the store and provider from configuration
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = create_storage_from_config(&config.storage).await?;
        let provider = Arc::new(HttpOAuthProvider::new(&config.oauth, &config.http)?);
        Self::new(config, store, provider)
    }
}

impl FromRef<AppState> for HandoffTokens {
    fn from_ref(state: &AppState) -> Self {
        state.handoff.clone()
    }
}

impl FromRef<AppState> for SessionCookies {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct AppError(StorelinkError);

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match &self.0 {
            StorelinkError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            StorelinkError::CsrfMismatch => (
                StatusCode::BAD_REQUEST,
                "csrf_mismatch",
                "Invalid or missing state".to_string(),
            ),
            StorelinkError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            StorelinkError::SignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                "Invalid signature".to_string(),
            ),
            StorelinkError::IdentityUnavailable(_) => (
                StatusCode::FORBIDDEN,
                "identity_unavailable",
                "Unable to retrieve merchant or authorized app".to_string(),
            ),
            StorelinkError::CredentialNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Credential not found: {}", id),
            ),
            StorelinkError::ExchangeFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "exchange_failed",
                "Authorization code exchange failed".to_string(),
            ),
            StorelinkError::RefreshFailed { .. } => (
                StatusCode::BAD_GATEWAY,
                "refresh_failed",
                "Token refresh failed".to_string(),
            ),
            StorelinkError::Network(_) => (
                StatusCode::BAD_GATEWAY,
                "network_error",
                "A network error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();

        // Full details stay in the logs; the client gets the sanitized message
        if status.is_server_error() || status == StatusCode::FORBIDDEN {
            tracing::error!(error_type, "Request failed: {}", self.0);
        } else {
            tracing::debug!(
                error_type = error_type,
                status = %status,
                message = %message,
                "HTTP request error response"
            );
        }

        let body = json!({
            "error": {
                "type": error_type,
                "message": message,
                "status": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<StorelinkError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Start the HTTP server and serve until ctrl-c
pub async fn start_server(config: Config) -> Result<()> {
    config.validate()?;

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| StorelinkError::config(format!("Invalid address {}: {}", addr, e)))?;

    let state = AppState::from_config(config).await?;
    let store = state.store.clone();
    let app = build_router(state);

    tracing::info!("Starting HTTP server on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| StorelinkError::config(format!("Server error: {}", e)))?;

    store.close().await?;
    tracing::info!("Credential store closed");
    Ok(())
}

/// Build the router with all endpoints
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.http.deploy_url);

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(oauth::create_oauth_routes(&state.config.oauth.callback_path))
        .merge(webhook::create_webhook_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().include_headers(false))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors),
        )
        .with_state(state)
}

/// Only the app's own origin may call the API with credentials
fn cors_layer(deploy_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = url::Url::parse(deploy_url)
        .ok()
        .map(|u| u.origin().ascii_serialization())
        .and_then(|origin| origin.parse().ok())
        .into_iter()
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}

#[cfg(test)]
mod http_test;
