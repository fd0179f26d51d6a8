//! Device-local variant of the tracker: no account, no deletion, entries kept
//! in a key-value file under one fixed key.

use crate::errors::AppError;
use crate::models::{EntryDraft, LocalEntry, Tins};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::error;

pub const LOCAL_STORAGE_KEY: &str = "waterEntries";

type Storage = BTreeMap<String, String>;

pub struct LocalStore {
    path: PathBuf,
    storage: Mutex<Storage>,
}

impl LocalStore {
    pub async fn open(path: PathBuf) -> Self {
        let storage = load_storage(&path).await;
        Self {
            path,
            storage: Mutex::new(storage),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn entries(&self) -> Vec<LocalEntry> {
        let storage = self.storage.lock().await;
        decode_entries(&storage)
    }

    /// Appends the drafted entry. Returns `None` when a field is missing.
    pub async fn append(&self, draft: &EntryDraft) -> Result<Option<LocalEntry>, AppError> {
        let date = draft.date.trim();
        let (Some(raw_tins), false) = (draft.tins, date.is_empty()) else {
            return Ok(None);
        };
        let tins = Tins::try_from(raw_tins).map_err(AppError::bad_request)?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| AppError::bad_request(format!("invalid date '{date}', expected YYYY-MM-DD")))?;
        let entry = LocalEntry { tins, date };

        let mut storage = self.storage.lock().await;
        let mut entries = decode_entries(&storage);
        entries.push(entry.clone());
        let encoded = serde_json::to_string(&entries).map_err(AppError::internal)?;
        let mut next = storage.clone();
        next.insert(LOCAL_STORAGE_KEY.to_string(), encoded);
        persist_storage(&self.path, &next).await?;
        *storage = next;

        Ok(Some(entry))
    }
}

pub fn total_tins(entries: &[LocalEntry]) -> u64 {
    entries.iter().map(|entry| u64::from(entry.tins.get())).sum()
}

fn decode_entries(storage: &Storage) -> Vec<LocalEntry> {
    let Some(raw) = storage.get(LOCAL_STORAGE_KEY) else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(err) => {
            error!("failed to parse stored local entries: {err}");
            Vec::new()
        }
    }
}

async fn load_storage(path: &Path) -> Storage {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(storage) => storage,
            Err(err) => {
                error!("failed to parse local storage file: {err}");
                Storage::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Storage::default(),
        Err(err) => {
            error!("failed to read local storage file: {err}");
            Storage::default()
        }
    }
}

async fn persist_storage(path: &Path, storage: &Storage) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(storage).map_err(AppError::internal)?;
    fs::write(path, payload).await?;
    Ok(())
}
