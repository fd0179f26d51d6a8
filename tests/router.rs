use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tower::ServiceExt;
use water_tracker::backend::{Backend, MemoryBackend, MemoryOp};
use water_tracker::models::{Credentials, NewEntry, Tins};
use water_tracker::{AppState, LocalStore, router};

const BODY_LIMIT: usize = 1024 * 1024;

async fn app(auto_confirm: bool) -> (Router, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new(auto_confirm, Duration::hours(1)));
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("water_tracker_router_{}_{nanos}.json", std::process::id()));
    let local = LocalStore::open(path).await;
    (router(AppState::new(backend.clone(), local)), backend)
}

fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(resp: &Response<Body>) -> Option<&str> {
    resp.headers().get(header::LOCATION).and_then(|v| v.to_str().ok())
}

fn cookie_of(resp: &Response<Body>) -> String {
    resp.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

async fn body_text(resp: Response<Body>) -> String {
    let bytes = to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn signed_in(app: &Router) -> String {
    let creds = "email=a%40b.com&password=pw123456";
    app.clone()
        .oneshot(form_post("/auth/sign-up", creds, None))
        .await
        .unwrap();
    let resp = app
        .clone()
        .oneshot(form_post("/auth/sign-in", creds, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    cookie_of(&resp)
}

#[tokio::test]
async fn anonymous_visit_redirects_before_any_record_read() {
    let (app, backend) = app(true).await;

    let resp = app.clone().oneshot(get("/form", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), Some("/"));

    let stale = "wt_sid=3f1c2b9e-7d4a-4e8b-9c1d-2a3b4c5d6e7f";
    let resp = app.clone().oneshot(get("/form", Some(stale))).await.unwrap();
    assert_eq!(location(&resp), Some("/"));

    assert_eq!(backend.list_calls(), 0);
}

#[tokio::test]
async fn unconfirmed_account_cannot_sign_in_until_confirmed() {
    let (app, backend) = app(false).await;
    let creds = "email=a%40b.com&password=pw123456";

    let resp = app
        .clone()
        .oneshot(form_post("/auth/sign-up", creds, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(location(&resp).is_none());
    assert!(body_text(resp).await.contains("✅ Signup successful! Check your email to confirm."));

    let resp = app
        .clone()
        .oneshot(form_post("/auth/sign-in", creds, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("❌ Email not confirmed"));

    backend.confirm_email("a@b.com").await;
    let resp = app
        .clone()
        .oneshot(form_post("/auth/sign-in", creds, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), Some("/form"));
}

#[tokio::test]
async fn signed_in_visitor_skips_auth_screen() {
    let (app, _) = app(true).await;
    let cookie = signed_in(&app).await;
    let resp = app.clone().oneshot(get("/", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), Some("/form"));
}

#[tokio::test]
async fn failed_delete_brings_entry_back_with_error() {
    let (app, backend) = app(true).await;
    let cookie = signed_in(&app).await;

    let create = Request::builder()
        .method("POST")
        .uri("/api/entries")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .body(Body::from(r#"{"tins":3,"date":"2024-01-01"}"#))
        .unwrap();
    let resp = app.clone().oneshot(create).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    backend.fail_next(MemoryOp::Delete, "delete refused").await;
    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/entries/{id}"))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(resp).await, "delete refused");

    let resp = app.clone().oneshot(get("/api/entries", Some(&cookie))).await.unwrap();
    let history: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(history["entries"].as_array().unwrap().len(), 1);
    assert_eq!(history["entries"][0]["id"], id.as_str());
    assert_eq!(history["total_tins"], 3);
    assert_eq!(history["error"], "delete refused");

    let page = app.clone().oneshot(get("/form", Some(&cookie))).await.unwrap();
    let html = body_text(page).await;
    assert!(html.contains("delete refused"));
    assert!(html.contains("3 Tin(s)"));
}

#[tokio::test]
async fn form_delete_removes_entry() {
    let (app, _) = app(true).await;
    let cookie = signed_in(&app).await;

    app.clone()
        .oneshot(form_post("/form/entries", "tins=5&date=2024-05-05", Some(&cookie)))
        .await
        .unwrap();
    let resp = app.clone().oneshot(get("/api/entries", Some(&cookie))).await.unwrap();
    let history: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    let id = history["entries"][0]["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(form_post(&format!("/form/entries/{id}/delete"), "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(location(&resp), Some("/form"));

    let resp = app.clone().oneshot(get("/form", Some(&cookie))).await.unwrap();
    let html = body_text(resp).await;
    assert!(html.contains("No data yet."));
    assert!(!html.contains("Total Tins Submitted"));
}

#[tokio::test]
async fn missing_date_is_a_bad_request_on_the_api() {
    let (app, _) = app(true).await;
    let cookie = signed_in(&app).await;
    let create = Request::builder()
        .method("POST")
        .uri("/api/entries")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .body(Body::from(r#"{"tins":2,"date":""}"#))
        .unwrap();
    let resp = app.clone().oneshot(create).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn event_stream_redirects_anonymous_browser() {
    let (app, _) = app(true).await;
    let resp = app.clone().oneshot(get("/api/session/events", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("event: redirect"));
    assert!(body.contains("data: /"));
}

#[tokio::test]
async fn event_stream_follows_sign_out_from_another_tab() {
    let (app, _) = app(true).await;
    let cookie = signed_in(&app).await;

    let resp = app
        .clone()
        .oneshot(get("/api/session/events", Some(&cookie)))
        .await
        .unwrap();
    let reader = tokio::spawn(body_text(resp));

    app.clone()
        .oneshot(form_post("/auth/sign-out", "", Some(&cookie)))
        .await
        .unwrap();

    let body = tokio::time::timeout(std::time::Duration::from_secs(2), reader)
        .await
        .expect("event stream stayed open after sign-out")
        .unwrap();
    assert!(body.contains("event: redirect"));
}

#[tokio::test]
async fn reloading_the_page_retries_a_failed_read_and_picks_up_new_entries() {
    let (app, backend) = app(true).await;
    let cookie = signed_in(&app).await;

    let page = app.clone().oneshot(get("/form", Some(&cookie))).await.unwrap();
    assert!(body_text(page).await.contains("No data yet."));

    // Written from another device with its own session.
    let other = backend
        .sign_in(&Credentials {
            email: "a@b.com".into(),
            password: "pw123456".into(),
        })
        .await
        .unwrap();
    let new = NewEntry {
        user_id: other.user_id(),
        tins: Tins::new(4).unwrap(),
        date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
    };
    backend.insert_entry(&other, &new).await.unwrap();

    backend.fail_next(MemoryOp::List, "connection reset").await;
    let page = app.clone().oneshot(get("/form", Some(&cookie))).await.unwrap();
    let html = body_text(page).await;
    assert!(html.contains("connection reset"));
    assert!(!html.contains("4 Tin(s)"));

    let page = app.clone().oneshot(get("/form", Some(&cookie))).await.unwrap();
    let html = body_text(page).await;
    assert!(!html.contains("connection reset"));
    assert!(html.contains("4 Tin(s)"));
    assert_eq!(backend.list_calls(), 3);
}

#[tokio::test]
async fn invalid_fields_are_a_bad_request_on_the_api() {
    let (app, _) = app(true).await;
    let cookie = signed_in(&app).await;

    for body in [r#"{"tins":9,"date":"2024-01-01"}"#, r#"{"tins":2,"date":"not-a-date"}"#] {
        let create = Request::builder()
            .method("POST")
            .uri("/api/entries")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, &cookie)
            .body(Body::from(body))
            .unwrap();
        let resp = app.clone().oneshot(create).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
