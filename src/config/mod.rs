//! Configuration management for Storelink
//!
//! Loads and manages Storelink configuration from storelink.config.json

use crate::constants::{self, CONFIG_FILE_NAME};
use crate::{Result, StorelinkError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete Storelink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Storage configuration (required)
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// OAuth client configuration
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Webhook verification configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Driver name (sqlite, memory)
    pub driver: String,

    /// Data source name / connection string
    pub dsn: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable secure cookies (requires HTTPS). Default: false for local development
    #[serde(default)]
    pub secure: bool,

    /// SameSite attribute for the session cookie
    #[serde(default)]
    pub same_site: SameSite,

    /// Public URL the app is deployed at (used for redirect URI and JWT issuer)
    #[serde(default = "default_deploy_url")]
    pub deploy_url: String,
}

/// SameSite cookie policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Lax,
    /// Required when the app is embedded in the merchant admin iframe
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// OAuth client configuration for the remote commerce platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    /// Client ID issued by the platform
    #[serde(default)]
    pub client_id: String,

    /// Client secret; also keys webhook signatures and handoff tokens.
    /// Supports `$env:VAR_NAME` references.
    #[serde(default)]
    pub client_secret: String,

    /// Scope requested during authorization
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Authorize endpoint template containing `{storeName}`
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// Token endpoint (code exchange and refresh)
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Admin GraphQL endpoint used to resolve merchant identity
    #[serde(default = "default_graph_api_url")]
    pub graph_api_url: String,

    /// Admin panel URL template containing `{storeName}`
    #[serde(default = "default_admin_url")]
    pub admin_url: String,

    /// Path of the callback route, appended to `http.deployUrl`
    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    /// Timeout in seconds for calls to the provider
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Password the sealing key is derived from (at least 32 characters).
    /// Supports `$env:VAR_NAME` references.
    #[serde(default)]
    pub password: String,

    /// Cookie name
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Lifetime of the sealed cookie in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: i64,

    /// Lifetime of an authorization handshake in seconds
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: i64,
}

/// What the webhook signature is computed over
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignatureBasis {
    /// HMAC over the envelope's `data` field exactly as delivered;
    /// the signature travels in the envelope's `signature` field
    #[default]
    Data,
    /// HMAC over the raw request body; the signature travels in a header
    #[serde(rename_all = "camelCase")]
    RawBody {
        #[serde(default = "default_signature_header")]
        header: String,
    },
}

/// Webhook verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default)]
    pub signature_basis: SignatureBasis,

    /// Scopes that revoke the sender's credential
    #[serde(default = "default_uninstall_scopes")]
    pub uninstall_scopes: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    constants::DEFAULT_HTTP_PORT
}

fn default_deploy_url() -> String {
    format!("http://localhost:{}", constants::DEFAULT_HTTP_PORT)
}

fn default_scope() -> String {
    constants::DEFAULT_OAUTH_SCOPE.to_string()
}

fn default_authorize_url() -> String {
    constants::DEFAULT_AUTHORIZE_URL.to_string()
}

fn default_token_url() -> String {
    constants::DEFAULT_TOKEN_URL.to_string()
}

fn default_graph_api_url() -> String {
    constants::DEFAULT_GRAPH_API_URL.to_string()
}

fn default_admin_url() -> String {
    constants::DEFAULT_ADMIN_URL.to_string()
}

fn default_callback_path() -> String {
    constants::OAUTH_CALLBACK_PATH.to_string()
}

fn default_request_timeout_secs() -> u64 {
    constants::DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_cookie_name() -> String {
    constants::DEFAULT_SESSION_COOKIE.to_string()
}

fn default_session_ttl_secs() -> i64 {
    constants::DEFAULT_SESSION_TTL_SECS
}

fn default_state_ttl_secs() -> i64 {
    constants::DEFAULT_STATE_TTL_SECS
}

fn default_signature_header() -> String {
    constants::DEFAULT_SIGNATURE_HEADER.to_string()
}

fn default_uninstall_scopes() -> Vec<String> {
    vec![constants::DEFAULT_UNINSTALL_SCOPE.to_string()]
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            same_site: SameSite::default(),
            deploy_url: default_deploy_url(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scope: default_scope(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            graph_api_url: default_graph_api_url(),
            admin_url: default_admin_url(),
            callback_path: default_callback_path(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            cookie_name: default_cookie_name(),
            ttl_secs: default_session_ttl_secs(),
            state_ttl_secs: default_state_ttl_secs(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signature_basis: SignatureBasis::default(),
            uninstall_scopes: default_uninstall_scopes(),
        }
    }
}

impl OAuthConfig {
    /// Redirect URI registered with the provider
    pub fn redirect_uri(&self, http: &HttpConfig) -> String {
        format!(
            "{}{}",
            http.deploy_url.trim_end_matches('/'),
            self.callback_path
        )
    }

    /// Authorize endpoint for one store
    pub fn authorize_url_for(&self, store_name: &str) -> String {
        self.authorize_url.replace("{storeName}", store_name)
    }

    /// Admin landing URL for one store
    pub fn admin_url_for(&self, store_name: &str) -> String {
        self.admin_url.replace("{storeName}", store_name)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path(CONFIG_FILE_NAME)
    }

    /// Load configuration from specific path
    ///
    /// Supports both JSON and YAML formats based on file extension:
    /// - `.json` files are parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Files without extension default to JSON parsing
    ///
    /// Secret-bearing fields may hold `$env:VAR_NAME` references, which are
    /// expanded after parsing.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Config = if !path.exists() {
            // Return default config if file doesn't exist
            Self::default()
        } else {
            let content = std::fs::read_to_string(path)?;

            match path.extension().and_then(|s| s.to_str()) {
                Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                    StorelinkError::config(format!("Failed to parse YAML config: {}", e))
                })?,
                _ => serde_json::from_str(&content).map_err(|e| {
                    StorelinkError::config(format!("Failed to parse JSON config: {}", e))
                })?,
            }
        };

        config.expand_env();
        Ok(config)
    }

    /// Save configuration to specific path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = match path_ref.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self).map_err(|e| {
                StorelinkError::config(format!("Failed to serialize to YAML: {}", e))
            })?,
            _ => serde_json::to_string_pretty(self)?,
        };

        std::fs::write(path_ref, content)?;
        Ok(())
    }

    /// Expand `$env:` references in secret-bearing fields
    fn expand_env(&mut self) {
        self.oauth.client_id = expand_env_value(&self.oauth.client_id);
        self.oauth.client_secret = expand_env_value(&self.oauth.client_secret);
        self.session.password = expand_env_value(&self.session.password);
        self.storage.dsn = expand_env_value(&self.storage.dsn);
    }

    /// Validate configuration
    ///
    /// Storage and HTTP settings are always checked. OAuth and session secrets are
    /// checked here too since every server path depends on them.
    pub fn validate(&self) -> Result<()> {
        self.validate_storage()?;

        if self.http.port == 0 {
            return Err(StorelinkError::config("http.port must be nonzero (1-65535)"));
        }
        if self.http.host.is_empty() {
            return Err(StorelinkError::config("http.host cannot be empty"));
        }
        url::Url::parse(&self.http.deploy_url).map_err(|e| {
            StorelinkError::config(format!("Invalid http.deployUrl '{}': {}", self.http.deploy_url, e))
        })?;

        if self.oauth.client_id.is_empty() {
            return Err(StorelinkError::config("oauth.clientId is required"));
        }
        if self.oauth.client_secret.is_empty() {
            return Err(StorelinkError::config("oauth.clientSecret is required"));
        }
        if !self.oauth.authorize_url.contains("{storeName}") {
            return Err(StorelinkError::config(
                "oauth.authorizeUrl must contain the {storeName} placeholder",
            ));
        }
        for (name, value) in [
            ("oauth.tokenUrl", &self.oauth.token_url),
            ("oauth.graphApiUrl", &self.oauth.graph_api_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                StorelinkError::config(format!("Invalid {} '{}': {}", name, value, e))
            })?;
        }
        if self.oauth.request_timeout_secs == 0 {
            return Err(StorelinkError::config(
                "oauth.requestTimeoutSecs must be greater than 0",
            ));
        }

        if self.session.password.len() < constants::MIN_SESSION_PASSWORD_LEN {
            return Err(StorelinkError::config(format!(
                "session.password must be at least {} characters",
                constants::MIN_SESSION_PASSWORD_LEN
            )));
        }
        if self.session.cookie_name.is_empty() {
            return Err(StorelinkError::config("session.cookieName cannot be empty"));
        }
        if self.session.ttl_secs <= 0 || self.session.state_ttl_secs <= 0 {
            return Err(StorelinkError::config(
                "session.ttlSecs and session.stateTtlSecs must be greater than 0",
            ));
        }

        if let SignatureBasis::RawBody { ref header } = self.webhook.signature_basis
            && header.is_empty()
        {
            return Err(StorelinkError::config(
                "webhook.signatureBasis.header is required for rawBody signatures",
            ));
        }

        Ok(())
    }

    /// Validate only the storage section (enough for offline CLI commands)
    pub fn validate_storage(&self) -> Result<()> {
        if self.storage.driver.is_empty() {
            return Err(StorelinkError::config("storage.driver is required"));
        }

        if self.storage.dsn.is_empty() {
            return Err(StorelinkError::config("storage.dsn is required"));
        }

        match self.storage.driver.as_str() {
            "sqlite" | "memory" => Ok(()),
            _ => Err(StorelinkError::config(format!(
                "Unsupported storage driver: '{}'. Supported: sqlite, memory",
                self.storage.driver
            ))),
        }
    }

    /// Log filter directive derived from the configured level
    pub fn log_filter(&self) -> Option<String> {
        self.log
            .as_ref()
            .and_then(|l| l.level.as_ref())
            .map(|level| format!("storelink={}", level))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                driver: "sqlite".to_string(),
                dsn: constants::default_sqlite_dsn().to_string(),
            },
            http: HttpConfig::default(),
            oauth: OAuthConfig::default(),
            session: SessionConfig::default(),
            webhook: WebhookConfig::default(),
            log: Some(LogConfig {
                level: Some("info".to_string()),
            }),
        }
    }
}

/// Expand environment variable references ($env:VAR_NAME)
pub fn expand_env_value(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("$env:") {
        std::env::var(var_name).unwrap_or_default()
    } else {
        value.to_string()
    }
}
