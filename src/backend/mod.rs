//! Client side of the hosted auth/database service.
//!
//! [`Backend`] is the seam every view talks through. [`SupabaseBackend`]
//! speaks the service's REST dialect; [`MemoryBackend`] keeps everything in
//! process with the same observable behaviour.

mod memory;
mod supabase;

pub use memory::{MemoryBackend, MemoryOp};
pub use supabase::SupabaseBackend;

use crate::config::BackendKind;
use crate::errors::BackendError;
use crate::models::{AuthSession, Credentials, Entry, NewEntry, User};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Table holding the tracked entries.
pub const ENTRIES_TABLE: &str = "water_entries";

/// Result of a registration. `session` is only present when the service
/// does not require email confirmation.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: User,
    pub session: Option<AuthSession>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome, BackendError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, BackendError>;

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError>;

    async fn sign_out(&self, session: &AuthSession) -> Result<(), BackendError>;

    /// All entries visible to the session, newest `created_at` first.
    async fn list_entries(&self, session: &AuthSession) -> Result<Vec<Entry>, BackendError>;

    async fn insert_entry(&self, session: &AuthSession, entry: &NewEntry) -> Result<Entry, BackendError>;

    async fn delete_entry(&self, session: &AuthSession, id: Uuid) -> Result<(), BackendError>;
}

pub fn build_backend(kind: &BackendKind) -> Result<Arc<dyn Backend>, BackendError> {
    let backend: Arc<dyn Backend> = match kind {
        BackendKind::Supabase(config) => Arc::new(SupabaseBackend::new(config.clone())?),
        BackendKind::Memory {
            auto_confirm,
            session_ttl,
        } => Arc::new(MemoryBackend::new(*auto_confirm, *session_ttl)),
    };
    Ok(backend)
}
