use crate::auth::{self, AuthOutcome};
use crate::cookies::{BrowserSession, expired_session_cookie, session_cookie};
use crate::errors::AppError;
use crate::guard::{AUTH_SCREEN, Admission, SessionGuard, TRACKER_PAGE, admit};
use crate::local::total_tins;
use crate::models::{AuthSession, Credentials, Entry, EntryDraft, HistoryResponse, LocalEntry, LocalHistoryResponse};
use crate::session::SessionId;
use crate::state::AppState;
use crate::tracker::{DeleteOutcome, SubmitOutcome, TrackerView};
use crate::ui::{render_auth, render_local, render_tracker};
use axum::{
    Form, Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{
        Html, IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

pub async fn index(State(state): State<AppState>, BrowserSession(sid): BrowserSession) -> Response {
    if let Admission::Admitted(_) = admit(&state.sessions, sid).await {
        return Redirect::to(TRACKER_PAGE).into_response();
    }
    Html(render_auth("", None)).into_response()
}

pub async fn sign_up(
    State(state): State<AppState>,
    browser: BrowserSession,
    Form(credentials): Form<Credentials>,
) -> Response {
    let sid = browser.or_generate();
    match auth::sign_up(&state.sessions, sid, &credentials).await {
        AuthOutcome::Message(message) => {
            let page = Html(render_auth(&credentials.email, Some(&message)));
            // Only worth a cookie if the backend handed out a session.
            if browser.0.is_none() && state.sessions.current(sid).await.is_some() {
                ([(header::SET_COOKIE, session_cookie(sid))], page).into_response()
            } else {
                page.into_response()
            }
        }
        AuthOutcome::Navigate(to) => navigate_with_session(sid, to),
    }
}

pub async fn sign_in(
    State(state): State<AppState>,
    browser: BrowserSession,
    Form(credentials): Form<Credentials>,
) -> Response {
    let sid = browser.or_generate();
    match auth::sign_in(&state.sessions, sid, &credentials).await {
        AuthOutcome::Navigate(to) => navigate_with_session(sid, to),
        AuthOutcome::Message(message) => Html(render_auth(&credentials.email, Some(&message))).into_response(),
    }
}

pub async fn sign_out(State(state): State<AppState>, BrowserSession(sid): BrowserSession) -> Response {
    if let Some(sid) = sid {
        state.views.unmount(sid).await;
        state.sessions.sign_out(sid).await;
    }
    ([(header::SET_COOKIE, expired_session_cookie())], Redirect::to(AUTH_SCREEN)).into_response()
}

pub async fn tracker_page(State(state): State<AppState>, BrowserSession(sid): BrowserSession) -> Response {
    let (sid, session) = match guarded(&state, sid).await {
        Ok(admitted) => admitted,
        Err(redirect) => return redirect.into_response(),
    };
    // Every visit re-reads the history, except the render that follows a
    // submit or delete, which shows what that action left behind.
    let (view, _) = state.views.mount(sid, session.user_id()).await;
    if !view.take_unseen_result() {
        view.load_history(state.backend(), &session).await;
    }
    let snapshot = view.snapshot().await;
    Html(render_tracker(session.user.email.as_deref(), &snapshot)).into_response()
}

pub async fn submit_entry(
    State(state): State<AppState>,
    BrowserSession(sid): BrowserSession,
    Form(draft): Form<EntryDraft>,
) -> Response {
    let (sid, session) = match guarded(&state, sid).await {
        Ok(admitted) => admitted,
        Err(redirect) => return redirect.into_response(),
    };
    let view = mounted_view(&state, sid, &session).await;
    view.submit(state.backend(), &session, &draft).await;
    Redirect::to(TRACKER_PAGE).into_response()
}

pub async fn delete_entry(
    State(state): State<AppState>,
    BrowserSession(sid): BrowserSession,
    Path(id): Path<Uuid>,
) -> Response {
    let (sid, session) = match guarded(&state, sid).await {
        Ok(admitted) => admitted,
        Err(redirect) => return redirect.into_response(),
    };
    let view = mounted_view(&state, sid, &session).await;
    view.delete(state.backend(), &session, id).await;
    Redirect::to(TRACKER_PAGE).into_response()
}

pub async fn list_entries(
    State(state): State<AppState>,
    BrowserSession(sid): BrowserSession,
) -> Result<Json<HistoryResponse>, AppError> {
    let (sid, session) = api_session(&state, sid).await?;
    let view = mounted_view(&state, sid, &session).await;
    let snapshot = view.snapshot().await;
    Ok(Json(HistoryResponse {
        total_tins: snapshot.history.total_tins(),
        entries: snapshot.history.entries().to_vec(),
        error: snapshot.error,
    }))
}

pub async fn create_entry(
    State(state): State<AppState>,
    BrowserSession(sid): BrowserSession,
    Json(draft): Json<EntryDraft>,
) -> Result<(StatusCode, Json<Entry>), AppError> {
    let (sid, session) = api_session(&state, sid).await?;
    let view = mounted_view(&state, sid, &session).await;
    match view.submit(state.backend(), &session, &draft).await {
        SubmitOutcome::Created(entry) => Ok((StatusCode::CREATED, Json(entry))),
        SubmitOutcome::Skipped => Err(AppError::bad_request("tins and date are required")),
        SubmitOutcome::Invalid(message) => Err(AppError::bad_request(message)),
        SubmitOutcome::Failed(message) => Err(AppError::bad_gateway(message)),
        SubmitOutcome::Discarded => Err(AppError::unauthorized()),
    }
}

pub async fn remove_entry(
    State(state): State<AppState>,
    BrowserSession(sid): BrowserSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let (sid, session) = api_session(&state, sid).await?;
    let view = mounted_view(&state, sid, &session).await;
    match view.delete(state.backend(), &session, id).await {
        DeleteOutcome::Deleted => Ok(StatusCode::NO_CONTENT),
        DeleteOutcome::RolledBack(message) => Err(AppError::bad_gateway(message)),
        DeleteOutcome::Discarded => Err(AppError::unauthorized()),
    }
}

/// Pushes a single `redirect` event once the browser's session is, or
/// becomes, absent. Server shutdown ends the stream without one.
pub async fn session_events(
    State(state): State<AppState>,
    BrowserSession(sid): BrowserSession,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let guard = SessionGuard::acquire(Arc::clone(&state.sessions), sid).await;
    let views = Arc::clone(&state.views);
    let shutdown = state.shutdown.clone();

    let redirect = async move {
        let target = match guard {
            Ok(mut guard) => tokio::select! {
                _ = shutdown.cancelled() => return None,
                target = guard.until_absent() => target,
            },
            Err(target) => target,
        };
        if let Some(sid) = sid {
            views.unmount(sid).await;
        }
        Some(Event::default().event("redirect").data(target))
    };

    let events = stream::once(redirect).filter_map(|event| async move { event.map(Ok::<_, Infallible>) });
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn local_page(State(state): State<AppState>) -> Html<String> {
    let entries = state.local.entries().await;
    Html(render_local(&entries, total_tins(&entries)))
}

pub async fn local_submit(
    State(state): State<AppState>,
    Form(draft): Form<EntryDraft>,
) -> Result<Redirect, AppError> {
    state.local.append(&draft).await?;
    Ok(Redirect::to("/local"))
}

pub async fn local_entries(State(state): State<AppState>) -> Json<LocalHistoryResponse> {
    let entries: Vec<LocalEntry> = state.local.entries().await;
    Json(LocalHistoryResponse {
        total_tins: total_tins(&entries),
        entries,
    })
}

/// Admission for page routes. A refused session also tears down whatever
/// view the browser had mounted.
async fn guarded(state: &AppState, sid: Option<SessionId>) -> Result<(SessionId, AuthSession), Redirect> {
    match (admit(&state.sessions, sid).await, sid) {
        (Admission::Admitted(session), Some(sid)) => Ok((sid, session)),
        (Admission::Redirect(to), Some(sid)) => {
            state.views.unmount(sid).await;
            Err(Redirect::to(to))
        }
        (_, None) => Err(Redirect::to(AUTH_SCREEN)),
    }
}

async fn api_session(state: &AppState, sid: Option<SessionId>) -> Result<(SessionId, AuthSession), AppError> {
    guarded(state, sid).await.map_err(|_| AppError::unauthorized())
}

/// The browser's view, loading its history when it was just created.
async fn mounted_view(state: &AppState, sid: SessionId, session: &AuthSession) -> Arc<TrackerView> {
    let (view, fresh) = state.views.mount(sid, session.user_id()).await;
    if fresh {
        view.load_history(state.backend(), session).await;
    }
    view
}

fn navigate_with_session(sid: SessionId, to: &'static str) -> Response {
    ([(header::SET_COOKIE, session_cookie(sid))], Redirect::to(to)).into_response()
}
