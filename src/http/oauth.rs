//! Authorization and session routes
//!
//! - `GET  /api/oauth/authorize/ikas` starts the handshake
//! - `GET  {callbackPath}` completes it
//! - `POST /api/oauth/get-token-with-signature` trades a signed launch for a token
//! - `GET  /api/oauth/check-for-reauthorize` compares granted and configured scope
//! - `GET  /api/auth/check`, `POST /api/auth/logout`
//! - `GET  /api/ikas/get-merchant` proxies an authenticated admin API call

use super::session::Session;
use super::{AppError, AppState};
use crate::StorelinkError;
use crate::auth::{AuthenticatedMerchant, SignedLaunch};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

const GET_MERCHANT_QUERY: &str = "{ getMerchant { id email storeName merchantName } }";

type HandlerResult = std::result::Result<Response, AppError>;

/// Create authorization routes
pub fn create_oauth_routes(callback_path: &str) -> Router<AppState> {
    Router::new()
        .route("/api/oauth/authorize/ikas", get(authorize_handler))
        .route(callback_path, get(callback_handler))
        .route(
            "/api/oauth/get-token-with-signature",
            post(token_with_signature_handler),
        )
        .route(
            "/api/oauth/check-for-reauthorize",
            get(check_reauthorize_handler),
        )
        .route("/api/auth/check", get(auth_check_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/ikas/get-merchant", get(get_merchant_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeQuery {
    pub store_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// 302 to the provider; the new state rides in the session cookie
async fn authorize_handler(
    State(state): State<AppState>,
    Session(mut session): Session,
    Query(query): Query<AuthorizeQuery>,
) -> HandlerResult {
    let store_name = query.store_name.unwrap_or_default();
    let url = state.flow.start(&mut session, store_name.trim())?;
    let cookie = state.sessions.set_cookie(&session)?;

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, url), (header::SET_COOKIE, cookie)],
    )
        .into_response())
}

/// 302 to the landing page on success
///
/// The session is written back on failure too, so the consumed state is gone
/// from the client's cookie as well.
async fn callback_handler(
    State(state): State<AppState>,
    Session(mut session): Session,
    Query(query): Query<CallbackQuery>,
) -> HandlerResult {
    let result = state
        .flow
        .complete_callback(query.code.as_deref(), query.state.as_deref(), &mut session)
        .await;
    let cookie = state.sessions.set_cookie(&session)?;

    match result {
        Ok(outcome) => Ok((
            StatusCode::FOUND,
            [
                (header::LOCATION, outcome.landing_path()),
                (header::SET_COOKIE, cookie),
            ],
        )
            .into_response()),
        Err(e) => {
            let mut response = AppError::from(e).into_response();
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Ok(response)
        }
    }
}

async fn token_with_signature_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> HandlerResult {
    let launch: SignedLaunch = serde_json::from_slice(&body)
        .map_err(|e| StorelinkError::validation(format!("Invalid request body: {}", e)))?;

    let token = state.flow.exchange_signed_launch(&launch).inspect_err(|e| {
        tracing::warn!(
            authorized_app_id = %launch.authorized_app_id,
            "Signed launch rejected: {}",
            e
        )
    })?;

    Ok(Json(json!({ "data": { "token": token } })).into_response())
}

async fn check_reauthorize_handler(
    State(state): State<AppState>,
    merchant: AuthenticatedMerchant,
    Session(mut session): Session,
) -> HandlerResult {
    let check = state.flow.check_reauthorize(&merchant, &mut session).await?;
    let body = Json(json!({ "data": check }));

    if check.required {
        let cookie = state.sessions.set_cookie(&session)?;
        return Ok(([(header::SET_COOKIE, cookie)], body).into_response());
    }
    Ok(body.into_response())
}

/// Whether the session holds a merchant whose credential is still live
async fn auth_check_handler(
    State(state): State<AppState>,
    Session(session): Session,
) -> HandlerResult {
    let not_authenticated = || Json(json!({ "data": { "isAuthenticated": false } }));

    if !session.is_authenticated_at(Utc::now()) {
        return Ok(not_authenticated().into_response());
    }
    let (Some(merchant_id), Some(authorized_app_id)) =
        (session.merchant_id, session.authorized_app_id)
    else {
        return Ok(not_authenticated().into_response());
    };

    if state.store.get(&authorized_app_id).await?.is_none() {
        return Ok(not_authenticated().into_response());
    }

    Ok(Json(json!({
        "data": {
            "isAuthenticated": true,
            "merchantId": merchant_id,
            "authorizedAppId": authorized_app_id,
        }
    }))
    .into_response())
}

async fn logout_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, state.sessions.clear_cookie())],
    )
        .into_response()
}

async fn get_merchant_handler(
    State(state): State<AppState>,
    merchant: AuthenticatedMerchant,
) -> HandlerResult {
    let data = state
        .api
        .graphql(&merchant.authorized_app_id, GET_MERCHANT_QUERY, None)
        .await?;

    Ok(Json(json!({ "data": data["getMerchant"] })).into_response())
}
