use crate::errors::BackendError;
use crate::guard::TRACKER_PAGE;
use crate::models::Credentials;
use crate::session::{SessionId, SessionProvider};
use tracing::warn;

pub const SIGN_UP_SUCCESS: &str = "✅ Signup successful! Check your email to confirm.";
pub const ERROR_MARK: &str = "❌ ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Stay on the auth screen and show this line.
    Message(String),
    Navigate(&'static str),
}

pub async fn sign_up(provider: &SessionProvider, sid: SessionId, credentials: &Credentials) -> AuthOutcome {
    if !credentials.is_complete() {
        return missing_fields();
    }
    match provider.sign_up(sid, credentials).await {
        Ok(_) => AuthOutcome::Message(SIGN_UP_SUCCESS.to_string()),
        Err(err) => failure("sign-up", err),
    }
}

pub async fn sign_in(provider: &SessionProvider, sid: SessionId, credentials: &Credentials) -> AuthOutcome {
    if !credentials.is_complete() {
        return missing_fields();
    }
    match provider.sign_in(sid, credentials).await {
        Ok(_) => AuthOutcome::Navigate(TRACKER_PAGE),
        Err(err) => failure("sign-in", err),
    }
}

fn missing_fields() -> AuthOutcome {
    AuthOutcome::Message(format!("{ERROR_MARK}Email and password are required"))
}

fn failure(action: &str, err: BackendError) -> AuthOutcome {
    warn!("{action} rejected: {err}");
    AuthOutcome::Message(format!("{ERROR_MARK}{err}"))
}
