//! Constants used throughout Storelink
//!
//! Configuration paths, cookie and route names, and token lifetimes.

use once_cell::sync::Lazy;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Get the home directory with fallback to current directory
pub fn get_home_dir() -> &'static str {
    static HOME_DIR: Lazy<String> = Lazy::new(|| {
        dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string())
    });
    &HOME_DIR
}

/// Default config directory (~/.storelink)
pub fn default_config_dir() -> &'static str {
    static CONFIG_DIR: Lazy<String> = Lazy::new(|| format!("{}/.storelink", get_home_dir()));
    &CONFIG_DIR
}

/// Default SQLite DSN (~/.storelink/credentials.db)
pub fn default_sqlite_dsn() -> &'static str {
    static SQLITE_DSN: Lazy<String> =
        Lazy::new(|| format!("{}/credentials.db", default_config_dir()));
    &SQLITE_DSN
}

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "storelink.config.json";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

// ============================================================================
// SESSION
// ============================================================================

/// Default session cookie name
pub const DEFAULT_SESSION_COOKIE: &str = "_session_data";

/// Session cookie lifetime (1 day)
pub const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60 * 24;

/// Lifetime of an in-flight authorization handshake
pub const DEFAULT_STATE_TTL_SECS: i64 = 60 * 10;

/// Minimum length of the session sealing password
pub const MIN_SESSION_PASSWORD_LEN: usize = 32;

// ============================================================================
// OAUTH
// ============================================================================

/// Scope requested from merchants
pub const DEFAULT_OAUTH_SCOPE: &str =
    "read_orders,write_orders,read_products,read_inventories,write_inventories";

/// Authorize endpoint template; `{storeName}` is replaced per merchant
pub const DEFAULT_AUTHORIZE_URL: &str = "https://{storeName}.myikas.com/api/admin/oauth/authorize";

/// Token endpoint used for code exchange and refresh
pub const DEFAULT_TOKEN_URL: &str = "https://api.myikas.com/api/admin/oauth/token";

/// Admin GraphQL endpoint
pub const DEFAULT_GRAPH_API_URL: &str = "https://api.myikas.com/api/v1/admin/graphql";

/// Admin panel landing URL template
pub const DEFAULT_ADMIN_URL: &str = "https://{storeName}.myikas.com/admin";

/// Callback route registered with the provider
pub const OAUTH_CALLBACK_PATH: &str = "/api/oauth/callback/ikas";

/// App-internal landing page after a successful callback
pub const CALLBACK_LANDING_PATH: &str = "/callback";

/// Timeout for token and GraphQL calls to the provider
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Handoff JWT lifetime (4 hours)
pub const HANDOFF_TOKEN_TTL_SECS: i64 = 60 * 60 * 4;

/// Maximum age of a signed launch timestamp (5 minutes)
pub const SIGNED_LAUNCH_MAX_AGE_MS: i64 = 5 * 60 * 1000;

// ============================================================================
// WEBHOOKS
// ============================================================================

/// Header carrying the signature when the raw body is signed
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-ikas-signature";

/// Webhook scope announcing that the app was removed from a store
pub const DEFAULT_UNINSTALL_SCOPE: &str = "store/app/deleted";
