use super::*;
use crate::auth::provider::HttpOAuthProvider;
use crate::config::HttpConfig;
use crate::storage::MemoryStorage;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "client-secret";

struct Harness {
    flow: AuthorizationFlow,
    store: Arc<MemoryStorage>,
    handoff: HandoffTokens,
}

fn harness(server_uri: &str) -> Harness {
    let mut config = Config::default();
    config.oauth.client_id = "client-id".to_string();
    config.oauth.client_secret = SECRET.to_string();
    config.oauth.token_url = format!("{}/oauth/token", server_uri);
    config.oauth.graph_api_url = format!("{}/graphql", server_uri);
    config.http = HttpConfig {
        deploy_url: "https://app.example.com".to_string(),
        ..Default::default()
    };

    let store = Arc::new(MemoryStorage::new());
    let provider = Arc::new(HttpOAuthProvider::new(&config.oauth, &config.http).unwrap());
    let handoff = HandoffTokens::new(SECRET, &config.http.deploy_url);
    let flow = AuthorizationFlow::new(
        store.clone(),
        provider,
        StateGuard::new(600),
        handoff.clone(),
        FlowSettings::from_config(&config),
    );

    Harness {
        flow,
        store,
        handoff,
    }
}

async fn mount_provider(server: &MockServer, scope: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "token_type": "Bearer",
            "expires_in": 14400,
            "scope": scope
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "getMerchant": { "id": "merchant-1", "storeName": "foo" },
                "getAuthorizedApp": { "id": "app-1", "salesChannelId": null }
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_start_redirects_with_state() {
    let h = harness("http://127.0.0.1:1");
    let mut session = SessionData::default();

    let url = h.flow.start(&mut session, "foo").unwrap();
    let state = session.state.clone().unwrap();

    assert!(url.starts_with("https://foo.myikas.com/api/admin/oauth/authorize?"));
    assert!(url.contains(&format!("state={}", state)));
    assert!(url.contains("client_id=client-id"));
    assert_eq!(session.store_name.as_deref(), Some("foo"));
}

#[tokio::test]
async fn test_start_rejects_bad_store_names() {
    let h = harness("http://127.0.0.1:1");
    let mut session = SessionData::default();

    assert!(matches!(
        h.flow.start(&mut session, ""),
        Err(StorelinkError::Validation(_))
    ));
    assert!(h.flow.start(&mut session, "evil.com/x").is_err());
    assert!(session.state.is_none());
}

#[tokio::test]
async fn test_callback_persists_credential() {
    let server = MockServer::start().await;
    mount_provider(&server, crate::constants::DEFAULT_OAUTH_SCOPE).await;
    let h = harness(&server.uri());

    let mut session = SessionData::default();
    h.flow.start(&mut session, "foo").unwrap();
    let state = session.state.clone().unwrap();

    let before = Utc::now();
    let outcome = h
        .flow
        .complete_callback(Some("code-1"), Some(&state), &mut session)
        .await
        .unwrap();

    let stored = h.store.get("app-1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-1");
    assert_eq!(stored.merchant_id, "merchant-1");
    assert!(stored.expire_date >= before + Duration::seconds(14400));

    assert!(session.state.is_none());
    assert_eq!(session.merchant_id.as_deref(), Some("merchant-1"));
    assert_eq!(session.authorized_app_id.as_deref(), Some("app-1"));
    assert!(session.is_authenticated_at(Utc::now()));

    assert_eq!(
        outcome.redirect_url,
        "https://foo.myikas.com/admin/authorized-app/app-1"
    );
    let claims = h.handoff.verify(&outcome.token).unwrap();
    assert_eq!(claims.sub, "merchant-1");
    assert_eq!(claims.aud, "app-1");

    let landing = outcome.landing_path();
    assert!(landing.starts_with("/callback?token="));
    assert!(landing.contains("authorizedAppId=app-1"));
    assert!(landing.contains("redirectUrl=https%3A%2F%2Ffoo.myikas.com%2Fadmin%2Fauthorized-app%2Fapp-1"));
}

#[tokio::test]
async fn test_callback_with_mismatched_state_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let h = harness(&server.uri());

    let mut session = SessionData::default();
    h.flow.start(&mut session, "foo").unwrap();

    let err = h
        .flow
        .complete_callback(Some("code-1"), Some("forged"), &mut session)
        .await
        .unwrap_err();

    assert!(matches!(err, StorelinkError::CsrfMismatch));
    assert!(h.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_callback_replay_fails() {
    let server = MockServer::start().await;
    mount_provider(&server, "read_orders").await;
    let h = harness(&server.uri());

    let mut session = SessionData::default();
    h.flow.start(&mut session, "foo").unwrap();
    let state = session.state.clone().unwrap();

    h.flow
        .complete_callback(Some("code-1"), Some(&state), &mut session)
        .await
        .unwrap();
    let err = h
        .flow
        .complete_callback(Some("code-1"), Some(&state), &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, StorelinkError::CsrfMismatch));
}

#[tokio::test]
async fn test_callback_missing_code() {
    let h = harness("http://127.0.0.1:1");
    let mut session = SessionData::default();
    h.flow.start(&mut session, "foo").unwrap();
    let state = session.state.clone().unwrap();

    let err = h
        .flow
        .complete_callback(None, Some(&state), &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, StorelinkError::Validation(_)));
}

#[tokio::test]
async fn test_callback_exchange_failure_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;
    let h = harness(&server.uri());

    let mut session = SessionData::default();
    h.flow.start(&mut session, "foo").unwrap();
    let state = session.state.clone().unwrap();

    let err = h
        .flow
        .complete_callback(Some("code-1"), Some(&state), &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, StorelinkError::ExchangeFailed(_)));
    assert!(h.store.list().await.unwrap().is_empty());
    assert!(session.merchant_id.is_none());
}

#[tokio::test]
async fn test_check_reauthorize() {
    let server = MockServer::start().await;
    mount_provider(&server, "read_orders").await;
    let h = harness(&server.uri());

    let mut session = SessionData::default();
    h.flow.start(&mut session, "foo").unwrap();
    let state = session.state.clone().unwrap();
    h.flow
        .complete_callback(Some("code-1"), Some(&state), &mut session)
        .await
        .unwrap();

    let merchant = AuthenticatedMerchant {
        merchant_id: "merchant-1".to_string(),
        authorized_app_id: "app-1".to_string(),
    };

    // Stored scope is narrower than the configured one
    let check = h
        .flow
        .check_reauthorize(&merchant, &mut session)
        .await
        .unwrap();
    assert!(check.required);
    let data = check.authorize_data.unwrap();
    assert_eq!(session.state.as_deref(), Some(data.state.as_str()));
    assert_eq!(
        data.redirect_uri,
        "https://app.example.com/api/oauth/callback/ikas"
    );

    // Matching scope in a different order needs nothing
    let mut stored = h.store.get("app-1").await.unwrap().unwrap();
    stored.scope =
        "write_inventories read_orders,write_orders,read_products,read_inventories".to_string();
    h.store.replace(&stored).await.unwrap();
    let check = h
        .flow
        .check_reauthorize(&merchant, &mut session)
        .await
        .unwrap();
    assert!(!check.required);

    let unknown = AuthenticatedMerchant {
        merchant_id: "merchant-1".to_string(),
        authorized_app_id: "app-9".to_string(),
    };
    assert!(matches!(
        h.flow.check_reauthorize(&unknown, &mut session).await,
        Err(StorelinkError::CredentialNotFound(_))
    ));
}

#[tokio::test]
async fn test_exchange_signed_launch() {
    let h = harness("http://127.0.0.1:1");
    let launch = SignedLaunch::signed(
        "app-1",
        "merchant-1",
        "foo",
        Utc::now().timestamp_millis(),
        SECRET,
    );

    let token = h.flow.exchange_signed_launch(&launch).unwrap();
    assert_eq!(h.handoff.verify(&token).unwrap().aud, "app-1");

    let forged = SignedLaunch::signed(
        "app-1",
        "merchant-1",
        "foo",
        Utc::now().timestamp_millis(),
        "wrong-secret",
    );
    assert!(matches!(
        h.flow.exchange_signed_launch(&forged),
        Err(StorelinkError::SignatureInvalid)
    ));
}
