use super::*;
use crate::auth::SignedLaunch;
use crate::utils::{TEST_CLIENT_SECRET, TestEnvironment};
use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookie(response: &Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response sets a cookie")
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` part of a Set-Cookie header, ready for a Cookie header
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

async fn mount_provider(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "token_type": "Bearer",
            "expires_in": 14400
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "getMerchant": { "id": "merchant-1", "storeName": "foo" },
                "getAuthorizedApp": { "id": "app-1", "salesChannelId": "channel-1" }
            }
        })))
        .mount(server)
        .await;
}

/// Run the authorize step and return the session cookie it set
async fn authorize(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/oauth/authorize/ikas?storeName=foo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let url = url::Url::parse(&location(&response)).unwrap();
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .unwrap();
    (cookie_pair(&set_cookie(&response)), state)
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = health_handler().await;
    assert_eq!(response.0.get("status").unwrap(), "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let env = TestEnvironment::new().await;
    let app = build_router(env.app_state());

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_authorize_redirects_and_sets_cookie() {
    let env = TestEnvironment::new().await;
    let app = build_router(env.app_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/oauth/authorize/ikas?storeName=foo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);

    let url = url::Url::parse(&location(&response)).unwrap();
    assert_eq!(url.host_str(), Some("foo.myikas.com"));
    let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "test-client");
    assert_eq!(
        params["redirect_uri"],
        "https://app.example.com/api/oauth/callback/ikas"
    );
    assert_eq!(params["scope"], crate::constants::DEFAULT_OAUTH_SCOPE);
    assert!(!params["state"].is_empty());

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("_session_data="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));

    // The cookie carries the same state, sealed
    let sessions = SessionCookies::new(&env.config).unwrap();
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(header::COOKIE, cookie_pair(&cookie).parse().unwrap());
    let session = sessions.from_headers(&headers);
    assert_eq!(session.state.as_deref(), Some(params["state"].as_str()));
    assert_eq!(session.store_name.as_deref(), Some("foo"));
}

#[tokio::test]
async fn test_authorize_requires_store_name() {
    let env = TestEnvironment::new().await;
    let app = build_router(env.app_state());

    for uri in [
        "/api/oauth/authorize/ikas",
        "/api/oauth/authorize/ikas?storeName=",
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}

#[tokio::test]
async fn test_callback_persists_credential_and_redirects() {
    let server = MockServer::start().await;
    mount_provider(&server).await;
    let env = TestEnvironment::with_provider_url(&server.uri()).await;
    let app = build_router(env.app_state());

    let (cookie, state) = authorize(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/oauth/callback/ikas?code=code-1&state={}",
                    state
                ))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let landing = location(&response);
    assert!(landing.starts_with("/callback?token="));
    assert!(landing.contains("authorizedAppId=app-1"));

    let stored = env.store.get("app-1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-1");
    assert_eq!(stored.refresh_token, "refresh-1");
    assert_eq!(stored.merchant_id, "merchant-1");
    assert_eq!(stored.sales_channel_id.as_deref(), Some("channel-1"));

    // State is gone from the new cookie and the identity is in
    let sessions = SessionCookies::new(&env.config).unwrap();
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        header::COOKIE,
        cookie_pair(&set_cookie(&response)).parse().unwrap(),
    );
    let session = sessions.from_headers(&headers);
    assert!(session.state.is_none());
    assert_eq!(session.merchant_id.as_deref(), Some("merchant-1"));
    assert_eq!(session.authorized_app_id.as_deref(), Some("app-1"));
}

#[tokio::test]
async fn test_callback_with_mismatched_state_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let env = TestEnvironment::with_provider_url(&server.uri()).await;
    let app = build_router(env.app_state());

    let (cookie, _state) = authorize(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/oauth/callback/ikas?code=code-1&state=forged")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_some());
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "csrf_mismatch");
    assert!(env.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_callback_without_session_is_rejected() {
    let env = TestEnvironment::new().await;
    let app = build_router(env.app_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/oauth/callback/ikas?code=code-1&state=anything")
                .header(header::COOKIE, "_session_data=not-a-sealed-value")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_identity_failure_is_forbidden() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
            "expires_in": 14400
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "getMerchant": null, "getAuthorizedApp": null }
        })))
        .mount(&server)
        .await;
    let env = TestEnvironment::with_provider_url(&server.uri()).await;
    let app = build_router(env.app_state());

    let (cookie, state) = authorize(&app).await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/oauth/callback/ikas?code=c&state={}", state))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(env.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_token_with_signature() {
    let env = TestEnvironment::new().await;
    let state = env.app_state();
    let handoff = state.handoff.clone();
    let app = build_router(state);

    let launch = SignedLaunch::signed(
        "app-1",
        "merchant-1",
        "foo",
        chrono::Utc::now().timestamp_millis(),
        TEST_CLIENT_SECRET,
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/oauth/get-token-with-signature")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&launch).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let claims = handoff
        .verify(body["data"]["token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.sub, "merchant-1");

    let mut forged = launch.clone();
    forged.merchant_id = "merchant-2".to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/oauth/get-token-with-signature")
                .body(Body::from(serde_json::to_vec(&forged).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/oauth/get-token-with-signature")
                .body(Body::from(r#"{"merchantId":"merchant-1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_for_reauthorize() {
    let env = TestEnvironment::new().await;
    let state = env.app_state();
    let token = state.handoff.mint("merchant-1", "app-1").unwrap();
    let app = build_router(state);

    let request = |token: Option<&str>| {
        let mut builder = Request::builder().uri("/api/oauth/check-for-reauthorize");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("JWT {}", token));
        }
        builder.body(Body::empty()).unwrap()
    };

    // No token
    let response = app.clone().oneshot(request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // No credential yet
    let response = app.clone().oneshot(request(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Same scope: nothing to do
    let mut credential = env.seed_credential("app-1", 3600).await;
    let response = app.clone().oneshot(request(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = body_json(response).await;
    assert_eq!(body["data"]["required"], false);

    // Narrower grant: a new state is issued
    credential.scope = "read_orders".to_string();
    env.store.replace(&credential).await.unwrap();
    let response = app.oneshot(request(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_some());
    let body = body_json(response).await;
    assert_eq!(body["data"]["required"], true);
    assert!(body["data"]["authorizeData"]["state"].is_string());
    assert_eq!(
        body["data"]["authorizeData"]["redirectUri"],
        "https://app.example.com/api/oauth/callback/ikas"
    );
}

#[tokio::test]
async fn test_auth_check_and_logout() {
    let server = MockServer::start().await;
    mount_provider(&server).await;
    let env = TestEnvironment::with_provider_url(&server.uri()).await;
    let app = build_router(env.app_state());

    let check = |cookie: Option<String>| {
        let mut builder = Request::builder().uri("/api/auth/check");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(check(None)).await.unwrap();
    assert_eq!(body_json(response).await["data"]["isAuthenticated"], false);

    // A handshake in progress is not a login
    let (cookie, state) = authorize(&app).await;
    let response = app.clone().oneshot(check(Some(cookie.clone()))).await.unwrap();
    assert_eq!(body_json(response).await["data"]["isAuthenticated"], false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/oauth/callback/ikas?code=c&state={}", state))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let session_cookie = cookie_pair(&set_cookie(&response));

    let response = app
        .clone()
        .oneshot(check(Some(session_cookie.clone())))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["isAuthenticated"], true);
    assert_eq!(body["data"]["merchantId"], "merchant-1");

    // Revoked credential ends the login
    env.store.soft_delete("app-1").await.unwrap();
    let response = app
        .clone()
        .oneshot(check(Some(session_cookie)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["data"]["isAuthenticated"], false);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(set_cookie(&response).contains("Max-Age=0"));
}

#[tokio::test]
async fn test_get_merchant_uses_stored_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(wiremock::matchers::header(
            "authorization",
            "Bearer app-1-access",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "getMerchant": { "id": "merchant-1", "storeName": "foo" } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let env = TestEnvironment::with_provider_url(&server.uri()).await;
    env.seed_credential("app-1", 3600).await;
    let state = env.app_state();
    let token = state.handoff.mint("merchant-1", "app-1").unwrap();
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/ikas/get-merchant")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["storeName"], "foo");
}

#[test]
fn test_app_error_status_mapping() {
    let cases = [
        (StorelinkError::validation("x"), StatusCode::BAD_REQUEST),
        (StorelinkError::CsrfMismatch, StatusCode::BAD_REQUEST),
        (StorelinkError::unauthorized("x"), StatusCode::UNAUTHORIZED),
        (StorelinkError::SignatureInvalid, StatusCode::UNAUTHORIZED),
        (
            StorelinkError::IdentityUnavailable("x".to_string()),
            StatusCode::FORBIDDEN,
        ),
        (
            StorelinkError::CredentialNotFound("x".to_string()),
            StatusCode::NOT_FOUND,
        ),
        (
            StorelinkError::exchange("x"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (StorelinkError::refresh("app-1", "x"), StatusCode::BAD_GATEWAY),
        (StorelinkError::config("x"), StatusCode::INTERNAL_SERVER_ERROR),
        (
            StorelinkError::Storage(crate::error::StorageError::Connection("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        assert_eq!(AppError::from(err).status(), status);
    }
}
