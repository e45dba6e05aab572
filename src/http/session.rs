//! Session cookies for the HTTP layer
//!
//! Reads the sealed session from the request cookie and writes it back with
//! the configured security attributes. A cookie that fails to unseal is treated
//! as no session at all.

use crate::Result;
use crate::auth::{SessionData, SessionSealer};
use crate::config::{Config, SameSite};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, header, request::Parts};
use std::convert::Infallible;

/// Cookie codec: sealer plus cookie attributes
#[derive(Clone)]
pub struct SessionCookies {
    sealer: SessionSealer,
    cookie_name: String,
    secure: bool,
    same_site: SameSite,
}

impl SessionCookies {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            sealer: SessionSealer::new(&config.session.password, config.session.ttl_secs)?,
            cookie_name: config.session.cookie_name.clone(),
            // Browsers drop SameSite=None cookies that are not Secure
            secure: config.http.secure || config.http.same_site == SameSite::None,
            same_site: config.http.same_site,
        })
    }

    /// Session carried by the request, or an empty one
    pub fn from_headers(&self, headers: &HeaderMap) -> SessionData {
        let Some(value) = cookie_value(headers, &self.cookie_name) else {
            return SessionData::default();
        };

        match self.sealer.unseal(&value) {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!("Ignoring unreadable session cookie: {}", e);
                SessionData::default()
            }
        }
    }

    /// `Set-Cookie` value carrying the sealed session
    pub fn set_cookie(&self, session: &SessionData) -> Result<String> {
        let sealed = self.sealer.seal(session)?;
        Ok(format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly;{} SameSite={}",
            self.cookie_name,
            sealed,
            self.sealer.ttl().num_seconds(),
            self.secure_flag(),
            self.same_site.as_str()
        ))
    }

    /// `Set-Cookie` value that removes the session
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly;{} SameSite={}",
            self.cookie_name,
            self.secure_flag(),
            self.same_site.as_str()
        )
    }

    fn secure_flag(&self) -> &'static str {
        if self.secure { " Secure;" } else { "" }
    }
}

/// Find a cookie by name across all `Cookie` headers
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Extractor for the request's session; never rejects
pub struct Session(pub SessionData);

impl<S> FromRequestParts<S> for Session
where
    SessionCookies: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = std::result::Result<Self, Self::Rejection>> + Send {
        let session = SessionCookies::from_ref(state).from_headers(&parts.headers);
        async move { Ok(Session(session)) }
    }
}
