use super::{Backend, ENTRIES_TABLE, SignUpOutcome};
use crate::config::SupabaseConfig;
use crate::errors::BackendError;
use crate::models::{AuthSession, Credentials, Entry, NewEntry, User};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::debug;
use uuid::Uuid;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(15);

pub struct SupabaseBackend {
    http: Client,
    config: Option<SupabaseConfig>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let now = Utc::now();
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in.unwrap_or(3600)));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// The auth and record services disagree on where the message lives.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

impl SupabaseBackend {
    pub fn new(config: Option<SupabaseConfig>) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    fn config(&self) -> Result<&SupabaseConfig, BackendError> {
        self.config.as_ref().ok_or(BackendError::NotConfigured)
    }

    fn auth_url(&self, path: &str) -> Result<String, BackendError> {
        Ok(format!("{}/auth/v1/{path}", self.config()?.url))
    }

    fn table_url(&self) -> Result<String, BackendError> {
        Ok(format!("{}/rest/v1/{ENTRIES_TABLE}", self.config()?.url))
    }

    fn with_key(&self, request: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        Ok(request.header("apikey", &self.config()?.anon_key))
    }

    fn with_session(&self, request: RequestBuilder, session: &AuthSession) -> Result<RequestBuilder, BackendError> {
        Ok(self.with_key(request)?.bearer_auth(&session.access_token))
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthSession, BackendError> {
        let request = self
            .http
            .post(self.auth_url("token")?)
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let response = checked(self.with_key(request)?.send().await?).await?;
        let token: TokenResponse = response.json().await.map_err(decode_error)?;
        Ok(token.into_session())
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome, BackendError> {
        let request = self.http.post(self.auth_url("signup")?).json(credentials);
        let response = checked(self.with_key(request)?.send().await?).await?;
        let body: serde_json::Value = response.json().await.map_err(decode_error)?;

        // With confirmations on the service returns the bare user; otherwise a
        // full token response.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body).map_err(decode_error)?;
            let session = token.into_session();
            Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user: User = serde_json::from_value(body).map_err(decode_error)?;
            Ok(SignUpOutcome { user, session: None })
        }
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, BackendError> {
        self.token_grant(
            "password",
            serde_json::json!({ "email": credentials.email, "password": credentials.password }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        self.token_grant("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), BackendError> {
        let request = self.http.post(self.auth_url("logout")?);
        checked(self.with_session(request, session)?.send().await?).await?;
        Ok(())
    }

    async fn list_entries(&self, session: &AuthSession) -> Result<Vec<Entry>, BackendError> {
        let request = self
            .http
            .get(self.table_url()?)
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let response = checked(self.with_session(request, session)?.send().await?).await?;
        let entries: Vec<Entry> = response.json().await.map_err(decode_error)?;
        debug!(count = entries.len(), "fetched entries");
        Ok(entries)
    }

    async fn insert_entry(&self, session: &AuthSession, entry: &NewEntry) -> Result<Entry, BackendError> {
        let request = self
            .http
            .post(self.table_url()?)
            .header("Prefer", "return=representation")
            .json(&[entry]);
        let response = checked(self.with_session(request, session)?.send().await?).await?;
        let mut rows: Vec<Entry> = response.json().await.map_err(decode_error)?;
        if rows.len() != 1 {
            return Err(BackendError::Decode(format!("insert returned {} rows", rows.len())));
        }
        Ok(rows.remove(0))
    }

    async fn delete_entry(&self, session: &AuthSession, id: Uuid) -> Result<(), BackendError> {
        let request = self
            .http
            .delete(self.table_url()?)
            .query(&[("id", format!("eq.{id}"))]);
        checked(self.with_session(request, session)?.send().await?).await?;
        Ok(())
    }
}

async fn checked(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.to_string()
            } else {
                text
            }
        });
    Err(BackendError::api(status.as_u16(), message))
}

fn decode_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::Decode(err.to_string())
}
