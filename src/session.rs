//! Per-browser sessions and their change notifications.
//!
//! The provider is the only owner of session state. Views read it through
//! [`SessionProvider::current`] and learn about transitions through a
//! [`SessionSubscription`], which unsubscribes when dropped.

use crate::backend::{Backend, SignUpOutcome};
use crate::errors::BackendError;
use crate::models::{AuthSession, Credentials};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// Opaque id of one browser, carried in the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn { user_id: Uuid },
    TokenRefreshed,
    SignedOut,
    Expired,
}

impl SessionChange {
    pub fn is_absent(self) -> bool {
        matches!(self, Self::SignedOut | Self::Expired)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionEvent {
    pub sid: SessionId,
    pub change: SessionChange,
}

pub struct SessionProvider {
    backend: Arc<dyn Backend>,
    sessions: RwLock<HashMap<SessionId, AuthSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionProvider {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            sessions: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Registers the account. A session is only stored when the backend
    /// hands one out straight away.
    pub async fn sign_up(&self, sid: SessionId, credentials: &Credentials) -> Result<SignUpOutcome, BackendError> {
        let outcome = self.backend.sign_up(credentials).await?;
        info!(user_id = %outcome.user.id, "account registered");
        if let Some(session) = &outcome.session {
            self.establish(sid, session.clone()).await;
        }
        Ok(outcome)
    }

    pub async fn sign_in(&self, sid: SessionId, credentials: &Credentials) -> Result<AuthSession, BackendError> {
        let session = self.backend.sign_in(credentials).await?;
        self.establish(sid, session.clone()).await;
        Ok(session)
    }

    /// Forgets the session locally even when the backend call fails.
    pub async fn sign_out(&self, sid: SessionId) {
        let removed = self.sessions.write().await.remove(&sid);
        let Some(session) = removed else {
            return;
        };
        if let Err(err) = self.backend.sign_out(&session).await {
            warn!(%sid, "backend sign-out failed: {err}");
        }
        info!(%sid, user_id = %session.user_id(), "signed out");
        self.publish(sid, SessionChange::SignedOut);
    }

    /// The live session for `sid`. An expired token is refreshed once; any
    /// failure along the way counts as no session.
    pub async fn current(&self, sid: SessionId) -> Option<AuthSession> {
        let session = self.sessions.read().await.get(&sid).cloned()?;
        if !session.is_expired_at(Utc::now()) {
            return Some(session);
        }

        match self.backend.refresh(&session.refresh_token).await {
            Ok(refreshed) => {
                let mut sessions = self.sessions.write().await;
                // Signed out while the refresh was in flight.
                if sessions.get(&sid).map(|s| &s.access_token) != Some(&session.access_token) {
                    return sessions.get(&sid).cloned();
                }
                sessions.insert(sid, refreshed.clone());
                drop(sessions);
                self.publish(sid, SessionChange::TokenRefreshed);
                Some(refreshed)
            }
            Err(err) => {
                debug!(%sid, "session refresh failed: {err}");
                let mut sessions = self.sessions.write().await;
                if sessions.get(&sid).map(|s| &s.access_token) != Some(&session.access_token) {
                    return sessions.get(&sid).cloned();
                }
                sessions.remove(&sid);
                drop(sessions);
                info!(%sid, "session expired");
                self.publish(sid, SessionChange::Expired);
                None
            }
        }
    }

    pub fn subscribe(&self, sid: SessionId) -> SessionSubscription {
        debug!(%sid, "session subscription opened");
        SessionSubscription {
            sid,
            receiver: self.events.subscribe(),
        }
    }

    async fn establish(&self, sid: SessionId, session: AuthSession) {
        let user_id = session.user_id();
        self.sessions.write().await.insert(sid, session);
        info!(%sid, %user_id, "signed in");
        self.publish(sid, SessionChange::SignedIn { user_id });
    }

    fn publish(&self, sid: SessionId, change: SessionChange) {
        // No subscribers is fine.
        let _ = self.events.send(SessionEvent { sid, change });
    }
}

/// Change feed for one browser session.
pub struct SessionSubscription {
    sid: SessionId,
    receiver: broadcast::Receiver<SessionEvent>,
}

/// What a subscription yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Changed(SessionChange),
    /// Events were dropped; the state has to be re-read.
    Missed,
}

impl SessionSubscription {
    pub fn sid(&self) -> SessionId {
        self.sid
    }

    /// Waits for the next notification about this session; `None` once the
    /// provider is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.sid == self.sid => return Some(Notification::Changed(event.change)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(sid = %self.sid, skipped, "session subscription lagged");
                    return Some(Notification::Missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        debug!(sid = %self.sid, "session subscription closed");
    }
}
