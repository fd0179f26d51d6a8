use crate::backend::Backend;
use crate::local::LocalStore;
use crate::session::SessionProvider;
use crate::tracker::ViewRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionProvider>,
    pub views: Arc<ViewRegistry>,
    pub local: Arc<LocalStore>,
    /// Cancelled when the server starts shutting down; ends open event streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, local: LocalStore) -> Self {
        Self {
            sessions: Arc::new(SessionProvider::new(backend)),
            views: Arc::new(ViewRegistry::default()),
            local: Arc::new(local),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.sessions.backend().as_ref()
    }
}
