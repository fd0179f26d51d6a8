//! Settings read from the process environment.

use chrono::Duration;
use std::{env, path::PathBuf};
use tracing::error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Connection settings for the hosted auth/database service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_ANON_KEY`. Missing values are logged
    /// and yield `None`; startup carries on with a backend that refuses calls.
    pub fn from_env() -> Option<Self> {
        let url = non_empty_var("SUPABASE_URL");
        let anon_key = non_empty_var("SUPABASE_ANON_KEY");
        match (url, anon_key) {
            (Some(url), Some(anon_key)) => Some(Self::new(url, anon_key)),
            _ => {
                error!("missing backend settings; check SUPABASE_URL and SUPABASE_ANON_KEY");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Supabase(Option<SupabaseConfig>),
    Memory { auto_confirm: bool, session_ttl: Duration },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub backend: BackendKind,
    pub local_data_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let backend = match non_empty_var("APP_BACKEND").as_deref() {
            Some("memory") => BackendKind::Memory {
                auto_confirm: non_empty_var("MEMORY_AUTO_CONFIRM")
                    .map(|value| parse_flag(&value))
                    .unwrap_or(false),
                session_ttl: Duration::seconds(
                    env::var("SESSION_TTL_SECS")
                        .ok()
                        .and_then(|value| value.parse::<i64>().ok())
                        .filter(|secs| *secs > 0)
                        .unwrap_or(DEFAULT_SESSION_TTL_SECS),
                ),
            },
            Some("supabase") | None => BackendKind::Supabase(SupabaseConfig::from_env()),
            Some(other) => {
                error!("unknown APP_BACKEND '{other}', falling back to supabase");
                BackendKind::Supabase(SupabaseConfig::from_env())
            }
        };

        Self {
            port,
            backend,
            local_data_path: resolve_local_data_path(),
        }
    }
}

pub fn resolve_local_data_path() -> PathBuf {
    if let Ok(path) = env::var("APP_DATA_PATH") {
        return PathBuf::from(path);
    }

    PathBuf::from("data/local_storage.json")
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supabase_url_loses_trailing_slash() {
        let config = SupabaseConfig::new("https://demo.supabase.co/", "anon");
        assert_eq!(config.url, "https://demo.supabase.co");
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}
