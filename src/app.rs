use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/auth/sign-up", post(handlers::sign_up))
        .route("/auth/sign-in", post(handlers::sign_in))
        .route("/auth/sign-out", post(handlers::sign_out))
        .route("/form", get(handlers::tracker_page))
        .route("/form/entries", post(handlers::submit_entry))
        .route("/form/entries/:id/delete", post(handlers::delete_entry))
        .route("/api/entries", get(handlers::list_entries).post(handlers::create_entry))
        .route("/api/entries/:id", delete(handlers::remove_entry))
        .route("/api/session/events", get(handlers::session_events))
        .route("/local", get(handlers::local_page))
        .route("/local/entries", post(handlers::local_submit))
        .route("/api/local/entries", get(handlers::local_entries))
        .with_state(state)
}
