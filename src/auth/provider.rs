//! Remote OAuth provider
//!
//! The provider seam covers the four remote interactions of the token lifecycle:
//! building the authorize URL, exchanging a code, refreshing a token and resolving
//! the identity a fresh token belongs to. `HttpOAuthProvider` talks to the real
//! platform through the oauth2 crate and the admin GraphQL API.

use crate::config::{HttpConfig, OAuthConfig};
use crate::error::NetworkError;
use crate::model::{RemoteIdentity, TokenGrant};
use crate::{Result, StorelinkError};
use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicTokenResponse, BasicTokenType};
use oauth2::{
    AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl,
    RefreshToken, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Client with only the token endpoint set; the authorize URL varies per store
type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const IDENTITY_QUERY: &str =
    "{ getMerchant { id storeName } getAuthorizedApp { id salesChannelId } }";

/// Remote OAuth provider operations
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the merchant is redirected to in order to grant access
    fn authorize_url(&self, store_name: &str, state: &str) -> Result<String>;

    /// Exchange an authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    /// Obtain a new token pair with a refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Resolve the merchant and authorized app a token was issued for
    async fn fetch_identity(&self, access_token: &str) -> Result<RemoteIdentity>;
}

/// Build the HTTP client used for every provider call
///
/// Redirects are never followed so codes and tokens cannot leak to another host.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StorelinkError::config(format!("Failed to build HTTP client: {}", e)))
}

/// OAuth provider backed by the platform's HTTP endpoints
#[derive(Clone)]
pub struct HttpOAuthProvider {
    client: TokenClient,
    http_client: reqwest::Client,
    oauth: OAuthConfig,
    redirect_uri: String,
}

impl HttpOAuthProvider {
    /// Create a provider from configuration
    pub fn new(oauth: &OAuthConfig, http: &HttpConfig) -> Result<Self> {
        let redirect_uri = oauth.redirect_uri(http);

        let client = BasicClient::new(ClientId::new(oauth.client_id.clone()))
            .set_client_secret(ClientSecret::new(oauth.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(
                TokenUrl::new(oauth.token_url.clone())
                    .map_err(|e| StorelinkError::config(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri.clone())
                    .map_err(|e| StorelinkError::config(format!("Invalid redirect URI: {}", e)))?,
            );

        Ok(Self {
            client,
            http_client: build_http_client(oauth.request_timeout_secs)?,
            oauth: oauth.clone(),
            redirect_uri,
        })
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    fn authorize_url(&self, store_name: &str, state: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.oauth.authorize_url_for(store_name))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.oauth.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.oauth.scope)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| StorelinkError::exchange(format!("Token exchange failed: {}", e)))?;

        Ok(grant_from_response(&token_result))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| {
                StorelinkError::Network(NetworkError::Http(format!(
                    "Token refresh failed: {}",
                    e
                )))
            })?;

        Ok(grant_from_response(&token_result))
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<RemoteIdentity> {
        let data = graphql_request(
            &self.http_client,
            &self.oauth.graph_api_url,
            access_token,
            IDENTITY_QUERY,
            None,
        )
        .await
        .map_err(|e| StorelinkError::IdentityUnavailable(e.to_string()))?;

        identity_from_data(data)
    }
}

fn grant_from_response(token_result: &BasicTokenResponse) -> TokenGrant {
    TokenGrant {
        access_token: token_result.access_token().secret().clone(),
        refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
        token_type: token_type_name(token_result.token_type()),
        // A grant without a lifetime is treated as already expired
        expires_in: token_result
            .expires_in()
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
        scope: token_result.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        }),
    }
}

fn token_type_name(token_type: &BasicTokenType) -> String {
    match token_type {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MerchantNode {
    id: String,
    store_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizedAppNode {
    id: String,
    sales_channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityData {
    get_merchant: Option<MerchantNode>,
    get_authorized_app: Option<AuthorizedAppNode>,
}

fn identity_from_data(data: Value) -> Result<RemoteIdentity> {
    let identity: IdentityData = serde_json::from_value(data)
        .map_err(|e| StorelinkError::IdentityUnavailable(format!("unexpected response: {}", e)))?;

    match (identity.get_merchant, identity.get_authorized_app) {
        (Some(merchant), Some(app)) if !merchant.id.is_empty() && !app.id.is_empty() => {
            Ok(RemoteIdentity {
                merchant_id: merchant.id,
                store_name: merchant.store_name,
                authorized_app_id: app.id,
                sales_channel_id: app.sales_channel_id,
            })
        }
        _ => Err(StorelinkError::IdentityUnavailable(
            "merchant or authorized app missing".to_string(),
        )),
    }
}

/// POST a GraphQL query with a bearer token and return its `data` member
///
/// GraphQL-level errors are surfaced as network errors with the first message.
pub async fn graphql_request(
    http_client: &reqwest::Client,
    url: &str,
    access_token: &str,
    query: &str,
    variables: Option<Value>,
) -> Result<Value> {
    let mut body = json!({ "query": query });
    if let Some(vars) = variables {
        body["variables"] = vars;
    }

    let response = http_client
        .post(url)
        .bearer_auth(access_token)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(StorelinkError::Network(NetworkError::Http(format!(
            "GraphQL request returned {}",
            status
        ))));
    }

    let mut payload: Value = response.json().await?;

    if let Some(message) = payload
        .get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|err| err.get("message"))
        .and_then(|m| m.as_str())
    {
        return Err(StorelinkError::Network(NetworkError::Http(format!(
            "GraphQL error: {}",
            message
        ))));
    }

    Ok(payload
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null))
}
