use super::{Backend, SignUpOutcome};
use crate::errors::BackendError;
use crate::models::{AuthSession, Credentials, Entry, NewEntry, User};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

/// Record operations that can be made to fail once, for exercising the
/// error paths of the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    List,
    Insert,
    Delete,
}

#[derive(Debug)]
struct MemoryUser {
    id: Uuid,
    password: String,
    confirmed: bool,
}

#[derive(Debug)]
struct IssuedToken {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// A refresh token and the access token it was issued alongside.
#[derive(Debug)]
struct RefreshGrant {
    user_id: Uuid,
    access_token: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, MemoryUser>,
    access_tokens: HashMap<String, IssuedToken>,
    refresh_tokens: HashMap<String, RefreshGrant>,
    /// Insertion order; listing walks it backwards.
    entries: Vec<Entry>,
    failures: HashMap<MemoryOp, String>,
}

impl MemoryState {
    fn email_of(&self, user_id: Uuid) -> Option<String> {
        self.users
            .iter()
            .find(|(_, user)| user.id == user_id)
            .map(|(email, _)| email.clone())
    }

    fn issue(&mut self, user_id: Uuid, ttl: Duration) -> AuthSession {
        let access_token = Uuid::new_v4().simple().to_string();
        let refresh_token = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let expires_at = now + ttl;
        self.access_tokens.retain(|_, token| token.expires_at > now);
        self.access_tokens.insert(
            access_token.clone(),
            IssuedToken {
                user_id,
                expires_at,
            },
        );
        self.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshGrant {
                user_id,
                access_token: access_token.clone(),
            },
        );
        AuthSession {
            access_token,
            refresh_token,
            expires_at,
            user: User {
                id: user_id,
                email: self.email_of(user_id),
            },
        }
    }

    /// Resolves the caller the way row-level security would.
    fn caller(&self, session: &AuthSession) -> Result<Uuid, BackendError> {
        let token = self
            .access_tokens
            .get(&session.access_token)
            .ok_or_else(|| BackendError::api(401, "invalid JWT"))?;
        if Utc::now() >= token.expires_at {
            return Err(BackendError::api(401, "JWT expired"));
        }
        Ok(token.user_id)
    }

    fn injected(&mut self, op: MemoryOp) -> Result<(), BackendError> {
        match self.failures.remove(&op) {
            Some(message) => Err(BackendError::api(500, message)),
            None => Ok(()),
        }
    }
}

/// In-process stand-in for the hosted service.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    auto_confirm: bool,
    session_ttl: Duration,
    list_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(auto_confirm: bool, session_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            auto_confirm,
            session_ttl,
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Marks the address as confirmed, as following the emailed link would.
    pub async fn confirm_email(&self, email: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&normalize_email(email)) {
            Some(user) => {
                user.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// The next call of `op` fails with `message`.
    pub async fn fail_next(&self, op: MemoryOp, message: impl Into<String>) {
        self.state.lock().await.failures.insert(op, message.into());
    }

    /// Drops every issued access token so sessions look expired to the views.
    pub async fn expire_tokens(&self) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        for token in state.access_tokens.values_mut() {
            token.expires_at = now;
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(false, Duration::seconds(crate::config::DEFAULT_SESSION_TTL_SECS))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome, BackendError> {
        let email = normalize_email(&credentials.email);
        if email.is_empty() {
            return Err(BackendError::api(400, "Anonymous sign-ins are disabled"));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::api(
                422,
                format!("Password should be at least {MIN_PASSWORD_LEN} characters."),
            ));
        }

        let mut state = self.state.lock().await;
        if state.users.contains_key(&email) {
            return Err(BackendError::api(422, "User already registered"));
        }

        let id = Uuid::new_v4();
        state.users.insert(
            email.clone(),
            MemoryUser {
                id,
                password: credentials.password.clone(),
                confirmed: self.auto_confirm,
            },
        );

        let session = self.auto_confirm.then(|| state.issue(id, self.session_ttl));
        Ok(SignUpOutcome {
            user: User {
                id,
                email: Some(email),
            },
            session,
        })
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, BackendError> {
        let mut state = self.state.lock().await;
        let (id, confirmed) = match state.users.get(&normalize_email(&credentials.email)) {
            Some(user) if user.password == credentials.password => (user.id, user.confirmed),
            _ => return Err(BackendError::api(400, "Invalid login credentials")),
        };
        if !confirmed {
            return Err(BackendError::api(400, "Email not confirmed"));
        }
        Ok(state.issue(id, self.session_ttl))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let mut state = self.state.lock().await;
        let grant = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| BackendError::api(400, "Invalid Refresh Token: Refresh Token Not Found"))?;
        state.access_tokens.remove(&grant.access_token);
        Ok(state.issue(grant.user_id, self.session_ttl))
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.access_tokens.remove(&session.access_token);
        state.refresh_tokens.remove(&session.refresh_token);
        Ok(())
    }

    async fn list_entries(&self, session: &AuthSession) -> Result<Vec<Entry>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.injected(MemoryOp::List)?;
        let caller = state.caller(session)?;

        let mut entries: Vec<Entry> = state
            .entries
            .iter()
            .rev()
            .filter(|entry| entry.user_id == caller)
            .cloned()
            .collect();
        // Stable, so rows sharing a timestamp stay newest-inserted first.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn insert_entry(&self, session: &AuthSession, entry: &NewEntry) -> Result<Entry, BackendError> {
        let mut state = self.state.lock().await;
        state.injected(MemoryOp::Insert)?;
        let caller = state.caller(session)?;
        if entry.user_id != caller {
            return Err(BackendError::api(
                403,
                "new row violates row-level security policy for table \"water_entries\"",
            ));
        }

        let stored = Entry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            tins: entry.tins,
            date: entry.date,
            created_at: Utc::now(),
        };
        state.entries.push(stored.clone());
        Ok(stored)
    }

    async fn delete_entry(&self, session: &AuthSession, id: Uuid) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.injected(MemoryOp::Delete)?;
        let caller = state.caller(session)?;
        // Rows owned by someone else are invisible, so the delete is a no-op.
        state
            .entries
            .retain(|entry| !(entry.id == id && entry.user_id == caller));
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
