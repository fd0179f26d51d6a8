use crate::session::SessionId;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use std::convert::Infallible;

pub const SESSION_COOKIE: &str = "wt_sid";

/// The browser's session id, if it sent a well-formed one.
#[derive(Debug, Clone, Copy)]
pub struct BrowserSession(pub Option<SessionId>);

impl BrowserSession {
    /// The existing id, or a fresh one for a browser seen for the first time.
    pub fn or_generate(self) -> SessionId {
        self.0.unwrap_or_else(SessionId::generate)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BrowserSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_from_headers(&parts.headers)))
    }
}

pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| value.trim().parse().ok())
}

pub fn session_cookie(sid: SessionId) -> String {
    format!("{SESSION_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
