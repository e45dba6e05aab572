//! Authenticated calls to the platform's admin API
//!
//! Every request asks the refresh coordinator for a valid bearer token first, so
//! route handlers never see an expired token.

use crate::Result;
use crate::auth::provider::graphql_request;
use crate::auth::refresh::RefreshCoordinator;
use serde_json::Value;
use std::sync::Arc;

/// GraphQL client acting on behalf of an authorized app
#[derive(Clone)]
pub struct AuthorizedApiClient {
    coordinator: Arc<RefreshCoordinator>,
    http_client: reqwest::Client,
    graph_api_url: String,
}

impl AuthorizedApiClient {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        http_client: reqwest::Client,
        graph_api_url: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            http_client,
            graph_api_url: graph_api_url.into(),
        }
    }

    /// Run a GraphQL query for an authorized app and return its `data`
    pub async fn graphql(
        &self,
        authorized_app_id: &str,
        query: &str,
        variables: Option<Value>,
    ) -> Result<Value> {
        let token = self.coordinator.ensure_fresh(authorized_app_id).await?;
        graphql_request(
            &self.http_client,
            &self.graph_api_url,
            &token,
            query,
            variables,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::{HttpOAuthProvider, build_http_client};
    use crate::config::{HttpConfig, OAuthConfig};
    use crate::model::{Credential, RemoteIdentity, TokenGrant};
    use crate::storage::{CredentialStore, MemoryStorage};
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_graphql_refreshes_expired_token_first() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-2",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer access-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "listProduct": { "count": 3 } }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let oauth = OAuthConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            token_url: format!("{}/oauth/token", mock_server.uri()),
            graph_api_url: format!("{}/graphql", mock_server.uri()),
            ..Default::default()
        };
        let provider = Arc::new(HttpOAuthProvider::new(&oauth, &HttpConfig::default()).unwrap());

        let store = Arc::new(MemoryStorage::new());
        let grant = TokenGrant {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            token_type: "Bearer".to_string(),
            expires_in: -1,
            scope: None,
        };
        let identity = RemoteIdentity {
            merchant_id: "merchant-1".to_string(),
            store_name: "foo".to_string(),
            authorized_app_id: "app-1".to_string(),
            sales_channel_id: None,
        };
        store
            .replace(&Credential::from_grant(&grant, &identity, Utc::now()))
            .await
            .unwrap();

        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), provider));
        let client = AuthorizedApiClient::new(
            coordinator,
            build_http_client(5).unwrap(),
            oauth.graph_api_url.clone(),
        );

        let data = client
            .graphql("app-1", "{ listProduct { count } }", None)
            .await
            .unwrap();
        assert_eq!(data["listProduct"]["count"], 3);
        assert_eq!(
            store.get("app-1").await.unwrap().unwrap().access_token,
            "access-2"
        );
    }
}
