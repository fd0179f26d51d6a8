use crate::models::AuthSession;
use crate::session::{Notification, SessionId, SessionProvider, SessionSubscription};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const AUTH_SCREEN: &str = "/";
pub const TRACKER_PAGE: &str = "/form";

/// Lower bound between expiry re-checks, so a token that comes back already
/// expired cannot spin the watcher.
const MIN_RECHECK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum Admission {
    Admitted(AuthSession),
    Redirect(&'static str),
}

/// Decides whether a request may see the tracker. Runs before any record is
/// read.
pub async fn admit(provider: &SessionProvider, sid: Option<SessionId>) -> Admission {
    let Some(sid) = sid else {
        return Admission::Redirect(AUTH_SCREEN);
    };
    match provider.current(sid).await {
        Some(session) => Admission::Admitted(session),
        None => Admission::Redirect(AUTH_SCREEN),
    }
}

/// An admitted session plus a live subscription to its changes.
pub struct SessionGuard {
    provider: Arc<SessionProvider>,
    session: AuthSession,
    subscription: SessionSubscription,
}

impl SessionGuard {
    /// Subscribes first and reads second, so no transition between the two
    /// goes unnoticed.
    pub async fn acquire(provider: Arc<SessionProvider>, sid: Option<SessionId>) -> Result<Self, &'static str> {
        let sid = sid.ok_or(AUTH_SCREEN)?;
        let subscription = provider.subscribe(sid);
        match admit(&provider, Some(sid)).await {
            Admission::Admitted(session) => Ok(Self {
                provider,
                session,
                subscription,
            }),
            Admission::Redirect(to) => Err(to),
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Resolves with the redirect target once the session is gone, either
    /// through a notification or because its token ran out and could not be
    /// renewed.
    pub async fn until_absent(&mut self) -> &'static str {
        let sid = self.subscription.sid();
        loop {
            let wait = (self.session.expires_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(MIN_RECHECK);

            tokio::select! {
                notification = self.subscription.next() => match notification {
                    None => return AUTH_SCREEN,
                    Some(Notification::Changed(change)) if change.is_absent() => {
                        debug!(%sid, ?change, "session gone");
                        return AUTH_SCREEN;
                    }
                    Some(_) => {}
                },
                _ = tokio::time::sleep(wait) => {}
            }

            match self.provider.current(sid).await {
                Some(session) => self.session = session,
                None => return AUTH_SCREEN,
            }
        }
    }
}
