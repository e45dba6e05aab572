//! Utility functions and helpers
//!
//! Test scaffolding shared by unit and integration tests.

use crate::auth::HttpOAuthProvider;
use crate::config::{Config, HttpConfig, OAuthConfig, SessionConfig, StorageConfig};
use crate::http::AppState;
use crate::model::{Credential, RemoteIdentity, TokenGrant};
use crate::storage::{CredentialStore, SqliteStorage};
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;

/// Client secret used by test configurations
pub const TEST_CLIENT_SECRET: &str = "test-client-secret";

/// Session password used by test configurations
pub const TEST_SESSION_PASSWORD: &str = "test-session-password-at-least-32-characters";

/// Public URL used by test configurations
pub const TEST_DEPLOY_URL: &str = "https://app.example.com";

/// Configuration pointing the provider endpoints at `provider_url`
///
/// Typically a `wiremock::MockServer` URI.
pub fn test_config(provider_url: &str, dsn: &str) -> Config {
    Config {
        storage: StorageConfig {
            driver: "sqlite".to_string(),
            dsn: dsn.to_string(),
        },
        http: HttpConfig {
            deploy_url: TEST_DEPLOY_URL.to_string(),
            ..Default::default()
        },
        oauth: OAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: TEST_CLIENT_SECRET.to_string(),
            token_url: format!("{}/oauth/token", provider_url),
            graph_api_url: format!("{}/graphql", provider_url),
            request_timeout_secs: 5,
            ..Default::default()
        },
        session: SessionConfig {
            password: TEST_SESSION_PASSWORD.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Test environment with an isolated temporary directory
///
/// Holds a SQLite credential store inside the temp directory and a config
/// whose provider endpoints point at the given URL. Everything is removed when
/// the environment is dropped.
///
/// # Example
///
/// ```no_run
/// use storelink::utils::TestEnvironment;
///
/// #[tokio::test]
/// async fn my_test() {
///     let env = TestEnvironment::new().await;
///     let state = env.app_state();
///     // Cleanup happens automatically when env drops
/// }
/// ```
pub struct TestEnvironment {
    /// Kept alive for the test's duration
    _temp_dir: TempDir,

    pub config: Config,
    pub store: Arc<SqliteStorage>,
}

impl TestEnvironment {
    /// Environment whose provider is unreachable
    pub async fn new() -> Self {
        Self::with_provider_url("http://127.0.0.1:1").await
    }

    /// Environment talking to a provider at `provider_url`
    pub async fn with_provider_url(provider_url: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join(".storelink").join("credentials.db");
        let dsn = db_path.to_str().expect("temp path is valid UTF-8").to_string();

        let config = test_config(provider_url, &dsn);
        let store = Arc::new(
            SqliteStorage::new(&dsn)
                .await
                .expect("Failed to create SQLite storage"),
        );

        TestEnvironment {
            _temp_dir: temp_dir,
            config,
            store,
        }
    }

    /// Application state wired to this environment's store and provider
    pub fn app_state(&self) -> AppState {
        let provider = Arc::new(
            HttpOAuthProvider::new(&self.config.oauth, &self.config.http)
                .expect("Failed to create OAuth provider"),
        );
        AppState::new(self.config.clone(), self.store.clone(), provider)
            .expect("Failed to create app state")
    }

    /// Store a credential whose token expires `expires_in` seconds from now
    pub async fn seed_credential(&self, authorized_app_id: &str, expires_in: i64) -> Credential {
        let grant = TokenGrant {
            access_token: format!("{}-access", authorized_app_id),
            refresh_token: Some(format!("{}-refresh", authorized_app_id)),
            token_type: "Bearer".to_string(),
            expires_in,
            scope: Some(self.config.oauth.scope.clone()),
        };
        let identity = RemoteIdentity {
            merchant_id: "merchant-1".to_string(),
            store_name: "foo".to_string(),
            authorized_app_id: authorized_app_id.to_string(),
            sales_channel_id: None,
        };
        self.store
            .replace(&Credential::from_grant(&grant, &identity, Utc::now()))
            .await
            .expect("Failed to seed credential")
    }
}
