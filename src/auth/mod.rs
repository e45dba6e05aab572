//! OAuth token lifecycle
//!
//! - **Signature**: HMAC-SHA256 webhook and signed-launch verification
//! - **Session**: sealed cookie sessions with single-use CSRF state
//! - **Provider**: remote token endpoint and identity lookup
//! - **Refresh**: expiry-aware refresh with one refresh in flight per credential
//! - **Flow**: authorize redirect and callback handling
//! - **Handoff**: short-lived JWTs for the frontend

pub mod api;
pub mod flow;
pub mod handoff;
pub mod provider;
pub mod refresh;
pub mod session;
pub mod signature;

pub use api::AuthorizedApiClient;
pub use flow::{AuthorizationFlow, CallbackOutcome, FlowSettings, ReauthorizeCheck};
pub use handoff::{AuthenticatedMerchant, HandoffClaims, HandoffTokens};
pub use provider::{HttpOAuthProvider, OAuthProvider};
pub use refresh::RefreshCoordinator;
pub use session::{SessionData, SessionSealer, StateGuard};
pub use signature::{SignedLaunch, sign, verify};
