//! The tracker page model: entry form, history list, and the view registry
//! that ties each model to one browser session.

use crate::backend::Backend;
use crate::models::{AuthSession, Entry, EntryDraft, NewEntry, Tins};
use crate::optimistic::{History, HistoryAction, apply_optimistic};
use crate::session::SessionId;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub tins: Tins,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerState {
    pub history: History,
    pub loading: bool,
    pub submitting: bool,
    pub error: Option<String>,
    pub form: FormState,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            history: History::default(),
            loading: true,
            submitting: false,
            error: None,
            form: FormState::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    Failed(String),
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(Entry),
    /// A required field was empty or the session belongs to someone else.
    Skipped,
    /// Tins out of range or a date that does not parse.
    Invalid(String),
    Failed(String),
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    RolledBack(String),
    Discarded,
}

/// One mounted tracker page. Dropping the registry entry or calling
/// [`TrackerView::unmount`] cancels everything still in flight; late results
/// are dropped instead of landing in a view nobody looks at.
pub struct TrackerView {
    user_id: Uuid,
    state: Mutex<TrackerState>,
    /// Set when a submit or delete left a result the page has not shown yet.
    unseen_result: AtomicBool,
    cancel: CancellationToken,
}

impl TrackerView {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            state: Mutex::new(TrackerState::default()),
            unseen_result: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub async fn snapshot(&self) -> TrackerState {
        self.state.lock().await.clone()
    }

    /// True once after a submit or delete settled; a page render that sees
    /// it shows the model as the action left it instead of reloading.
    pub fn take_unseen_result(&self) -> bool {
        self.unseen_result.swap(false, Ordering::SeqCst)
    }

    fn mark_unseen_result(&self) {
        self.unseen_result.store(true, Ordering::SeqCst);
    }

    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    pub fn is_mounted(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    async fn until_unmounted<F: Future>(&self, fut: F) -> Option<F::Output> {
        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = fut => Some(output),
        };
        output.filter(|_| self.is_mounted())
    }

    /// Replaces the history with the backend's view of it.
    pub async fn load_history(&self, backend: &dyn Backend, session: &AuthSession) -> LoadOutcome {
        self.state.lock().await.loading = true;

        let Some(result) = self.until_unmounted(backend.list_entries(session)).await else {
            debug!(user_id = %self.user_id, "discarding history fetch for unmounted view");
            return LoadOutcome::Discarded;
        };

        let mut state = self.state.lock().await;
        state.loading = false;
        match result {
            Ok(entries) => {
                let count = entries.len();
                let (next, _) = apply_optimistic(&state.history, HistoryAction::Replace(entries));
                state.history = next;
                state.error = None;
                LoadOutcome::Loaded(count)
            }
            Err(err) => {
                warn!(user_id = %self.user_id, "history fetch failed: {err}");
                let message = err.to_string();
                state.error = Some(message.clone());
                LoadOutcome::Failed(message)
            }
        }
    }

    pub async fn submit(&self, backend: &dyn Backend, session: &AuthSession, draft: &EntryDraft) -> SubmitOutcome {
        let date_text = draft.date.trim();
        if session.user_id() != self.user_id || date_text.is_empty() {
            return SubmitOutcome::Skipped;
        }
        let Some(raw_tins) = draft.tins else {
            return SubmitOutcome::Skipped;
        };

        let parsed = Tins::try_from(raw_tins).and_then(|tins| {
            NaiveDate::parse_from_str(date_text, "%Y-%m-%d")
                .map(|date| (tins, date))
                .map_err(|_| format!("invalid date '{date_text}', expected YYYY-MM-DD"))
        });
        let (tins, date) = match parsed {
            Ok(fields) => fields,
            Err(message) => {
                let mut state = self.state.lock().await;
                state.error = Some(message.clone());
                state.form.date = draft.date.clone();
                self.mark_unseen_result();
                return SubmitOutcome::Invalid(message);
            }
        };

        {
            let mut state = self.state.lock().await;
            state.submitting = true;
            state.error = None;
            state.form = FormState {
                tins,
                date: draft.date.clone(),
            };
        }

        let new_entry = NewEntry {
            user_id: self.user_id,
            tins,
            date,
        };
        let Some(result) = self.until_unmounted(backend.insert_entry(session, &new_entry)).await else {
            debug!(user_id = %self.user_id, "discarding insert result for unmounted view");
            return SubmitOutcome::Discarded;
        };

        let mut state = self.state.lock().await;
        state.submitting = false;
        self.mark_unseen_result();
        match result {
            Ok(entry) => {
                let (next, _) = apply_optimistic(&state.history, HistoryAction::Prepend(entry.clone()));
                state.history = next;
                state.form = FormState::default();
                info!(user_id = %self.user_id, entry_id = %entry.id, tins = %entry.tins, "entry created");
                SubmitOutcome::Created(entry)
            }
            Err(err) => {
                warn!(user_id = %self.user_id, "insert failed: {err}");
                let message = err.to_string();
                state.error = Some(message.clone());
                SubmitOutcome::Failed(message)
            }
        }
    }

    /// Hides the entry at once and puts the old list back if the backend
    /// refuses.
    pub async fn delete(&self, backend: &dyn Backend, session: &AuthSession, id: Uuid) -> DeleteOutcome {
        let rollback = {
            let mut state = self.state.lock().await;
            let (next, rollback) = apply_optimistic(&state.history, HistoryAction::Remove(id));
            state.history = next;
            rollback
        };

        let Some(result) = self.until_unmounted(backend.delete_entry(session, id)).await else {
            debug!(user_id = %self.user_id, entry_id = %id, "discarding delete result for unmounted view");
            return DeleteOutcome::Discarded;
        };

        self.mark_unseen_result();
        match result {
            Ok(()) => {
                info!(user_id = %self.user_id, entry_id = %id, "entry deleted");
                DeleteOutcome::Deleted
            }
            Err(err) => {
                warn!(user_id = %self.user_id, entry_id = %id, "delete failed, restoring list: {err}");
                let message = err.to_string();
                let mut state = self.state.lock().await;
                state.history = rollback;
                state.error = Some(message.clone());
                DeleteOutcome::RolledBack(message)
            }
        }
    }
}

impl Drop for TrackerView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Mounted tracker views keyed by browser session.
#[derive(Default)]
pub struct ViewRegistry {
    views: Mutex<HashMap<SessionId, Arc<TrackerView>>>,
}

impl ViewRegistry {
    /// Returns the view for `sid`, creating it when absent or when a
    /// different user now owns the browser session. The flag is true for a
    /// freshly created view, whose history still has to be loaded.
    pub async fn mount(&self, sid: SessionId, user_id: Uuid) -> (Arc<TrackerView>, bool) {
        let mut views = self.views.lock().await;
        if let Some(view) = views.get(&sid) {
            if view.user_id() == user_id && view.is_mounted() {
                return (Arc::clone(view), false);
            }
            view.unmount();
        }

        let view = Arc::new(TrackerView::new(user_id));
        views.insert(sid, Arc::clone(&view));
        info!(%sid, %user_id, "tracker view mounted");
        (view, true)
    }

    pub async fn unmount(&self, sid: SessionId) {
        if let Some(view) = self.views.lock().await.remove(&sid) {
            view.unmount();
            info!(%sid, "tracker view unmounted");
        }
    }

    pub async fn len(&self) -> usize {
        self.views.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryOp};
    use crate::errors::BackendError;
    use crate::models::{Credentials, User};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    async fn setup() -> (Arc<MemoryBackend>, AuthSession, TrackerView) {
        let backend = Arc::new(MemoryBackend::new(true, Duration::hours(1)));
        let creds = Credentials {
            email: "a@b.com".into(),
            password: "pw123456".into(),
        };
        let session = backend.sign_up(&creds).await.unwrap().session.unwrap();
        let view = TrackerView::new(session.user_id());
        (backend, session, view)
    }

    fn draft(tins: u8, date: &str) -> EntryDraft {
        EntryDraft {
            tins: Some(tins),
            date: date.into(),
        }
    }

    #[tokio::test]
    async fn two_submissions_show_newest_first_with_total() {
        let (backend, session, view) = setup().await;
        view.load_history(backend.as_ref(), &session).await;

        let first = view.submit(backend.as_ref(), &session, &draft(3, "2024-01-01")).await;
        let second = view.submit(backend.as_ref(), &session, &draft(2, "2024-01-02")).await;
        assert!(matches!(first, SubmitOutcome::Created(_)));
        assert!(matches!(second, SubmitOutcome::Created(_)));

        let state = view.snapshot().await;
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history.total_tins(), 5);
        assert_eq!(state.history.entries()[0].tins.get(), 2);
        assert_eq!(state.history.entries()[0].user_id, session.user_id());
        assert_eq!(state.form, FormState::default());

        view.load_history(backend.as_ref(), &session).await;
        assert_eq!(view.snapshot().await.history, state.history);
    }

    #[tokio::test]
    async fn missing_date_issues_no_write() {
        let (backend, session, view) = setup().await;
        let outcome = view.submit(backend.as_ref(), &session, &draft(2, "  ")).await;
        assert_eq!(outcome, SubmitOutcome::Skipped);
        assert!(backend.list_entries(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_insert_keeps_form_and_shows_message() {
        let (backend, session, view) = setup().await;
        backend.fail_next(MemoryOp::Insert, "insert refused").await;

        let outcome = view.submit(backend.as_ref(), &session, &draft(4, "2024-03-05")).await;
        assert_eq!(outcome, SubmitOutcome::Failed("insert refused".into()));

        let state = view.snapshot().await;
        assert_eq!(state.error.as_deref(), Some("insert refused"));
        assert_eq!(state.form.tins.get(), 4);
        assert_eq!(state.form.date, "2024-03-05");
        assert!(state.history.is_empty());
        assert!(!state.submitting);
    }

    #[tokio::test]
    async fn out_of_range_tins_and_bad_dates_are_invalid() {
        let (backend, session, view) = setup().await;

        let outcome = view.submit(backend.as_ref(), &session, &draft(9, "2024-01-01")).await;
        assert_eq!(outcome, SubmitOutcome::Invalid("tins must be between 1 and 5".into()));

        let outcome = view.submit(backend.as_ref(), &session, &draft(2, "not-a-date")).await;
        assert!(matches!(outcome, SubmitOutcome::Invalid(_)));
        assert_eq!(
            view.snapshot().await.error.as_deref(),
            Some("invalid date 'not-a-date', expected YYYY-MM-DD")
        );
        assert!(backend.list_entries(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_history_read_shows_error_until_a_retry_succeeds() {
        let (backend, session, view) = setup().await;
        let new = NewEntry {
            user_id: session.user_id(),
            tins: Tins::new(4).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        };
        backend.insert_entry(&session, &new).await.unwrap();

        backend.fail_next(MemoryOp::List, "connection reset").await;
        let outcome = view.load_history(backend.as_ref(), &session).await;
        assert_eq!(outcome, LoadOutcome::Failed("connection reset".into()));
        let state = view.snapshot().await;
        assert_eq!(state.error.as_deref(), Some("connection reset"));
        assert!(state.history.is_empty());
        assert!(!state.loading);

        assert_eq!(view.load_history(backend.as_ref(), &session).await, LoadOutcome::Loaded(1));
        let state = view.snapshot().await;
        assert!(state.error.is_none());
        assert_eq!(state.history.total_tins(), 4);
    }

    #[tokio::test]
    async fn settled_actions_are_reported_once() {
        let (backend, session, view) = setup().await;
        assert!(!view.take_unseen_result());

        view.submit(backend.as_ref(), &session, &draft(1, "2024-01-01")).await;
        assert!(view.take_unseen_result());
        assert!(!view.take_unseen_result());

        view.submit(backend.as_ref(), &session, &draft(1, "")).await;
        assert!(!view.take_unseen_result());
    }

    #[tokio::test]
    async fn failed_delete_rolls_back() {
        let (backend, session, view) = setup().await;
        view.submit(backend.as_ref(), &session, &draft(3, "2024-01-01")).await;
        let before = view.snapshot().await.history;
        let id = before.entries()[0].id;

        backend.fail_next(MemoryOp::Delete, "delete refused").await;
        let outcome = view.delete(backend.as_ref(), &session, id).await;
        assert_eq!(outcome, DeleteOutcome::RolledBack("delete refused".into()));

        let state = view.snapshot().await;
        assert_eq!(state.history, before);
        assert_eq!(state.error.as_deref(), Some("delete refused"));

        assert_eq!(view.delete(backend.as_ref(), &session, id).await, DeleteOutcome::Deleted);
        assert!(view.snapshot().await.history.is_empty());
    }

    /// Never answers, so the only way out is cancellation.
    struct Stalled;

    #[async_trait]
    impl Backend for Stalled {
        async fn sign_up(&self, _: &Credentials) -> Result<crate::backend::SignUpOutcome, BackendError> {
            Err(BackendError::NotConfigured)
        }
        async fn sign_in(&self, _: &Credentials) -> Result<AuthSession, BackendError> {
            Err(BackendError::NotConfigured)
        }
        async fn refresh(&self, _: &str) -> Result<AuthSession, BackendError> {
            Err(BackendError::NotConfigured)
        }
        async fn sign_out(&self, _: &AuthSession) -> Result<(), BackendError> {
            Ok(())
        }
        async fn list_entries(&self, _: &AuthSession) -> Result<Vec<Entry>, BackendError> {
            std::future::pending().await
        }
        async fn insert_entry(&self, _: &AuthSession, _: &NewEntry) -> Result<Entry, BackendError> {
            std::future::pending().await
        }
        async fn delete_entry(&self, _: &AuthSession, _: Uuid) -> Result<(), BackendError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn unmount_discards_in_flight_results() {
        let session = AuthSession {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() + Duration::hours(1),
            user: User {
                id: Uuid::new_v4(),
                email: None,
            },
        };
        let view = Arc::new(TrackerView::new(session.user_id()));

        let task = {
            let view = Arc::clone(&view);
            let session = session.clone();
            tokio::spawn(async move { view.submit(&Stalled, &session, &draft(1, "2024-01-01")).await })
        };
        tokio::task::yield_now().await;
        view.unmount();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("submit was not cancelled")
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Discarded);
        assert!(view.snapshot().await.history.is_empty());
    }

    #[tokio::test]
    async fn registry_remounts_for_a_different_user() {
        let registry = ViewRegistry::default();
        let sid = SessionId::generate();
        let (first, fresh) = registry.mount(sid, Uuid::new_v4()).await;
        assert!(fresh);
        let (again, fresh) = registry.mount(sid, first.user_id()).await;
        assert!(!fresh);
        assert!(Arc::ptr_eq(&first, &again));

        let (other, fresh) = registry.mount(sid, Uuid::new_v4()).await;
        assert!(fresh);
        assert!(!first.is_mounted());
        assert!(other.is_mounted());

        registry.unmount(sid).await;
        assert!(!other.is_mounted());
        assert_eq!(registry.len().await, 0);
    }
}
