//! Storelink - OAuth token lifecycle and webhook trust for commerce app integrations
//!
//! This library keeps an app's platform credentials fresh and its inbound
//! traffic authenticated. It can be:
//! - Used as a library behind your own routes
//! - Run as a CLI tool (`storelink` binary)
//! - Exposed as an HTTP server
//!
//! # Architecture
//!
//! - Credential store with in-memory and SQLite backends
//! - HMAC-SHA256 verification of webhooks and signed launches
//! - Sealed cookie sessions carrying single-use CSRF state
//! - Token refresh with at most one refresh in flight per credential
//! - Authorization redirect, callback and code exchange
//!
//! # Example
//!
//! ```rust,no_run
//! use storelink::config::Config;
//! use storelink::http::AppState;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let state = AppState::from_config(config).await?;
//!
//!     // Always a valid bearer token, refreshed if it had expired
//!     let token = state.refresh.ensure_fresh("authorized-app-id").await?;
//!     println!("{}", token.len());
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Infrastructure
pub mod config;
pub mod storage;
pub mod telemetry;

// Token lifecycle
pub mod auth;

// Interface layers
pub mod cli;
pub mod http;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use error::{Result, StorelinkError};
pub use model::{Credential, RemoteIdentity, TokenGrant};

/// Initialize logging for the application
///
/// `RUST_LOG` wins over `filter`, which wins over the `storelink=info` default.
pub fn init_logging(filter: Option<String>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let default_filter = filter.unwrap_or_else(|| "storelink=info".to_string());
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
