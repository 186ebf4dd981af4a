//! Whole-collection persistence.
//!
//! Every mutation rewrites the full collection. That keeps the on-disk format
//! trivially consistent and is fine for hundreds to low thousands of
//! sessions; beyond that, replace the [`SessionPersistence`] implementation
//! (e.g. with an append-only log plus compaction) without touching the
//! [`SessionStore`](crate::SessionStore) contract.

use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronicle_core::{ChronicleError, ChronicleResult};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Reads and writes the entire session collection as one atomic unit.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Location of the durable resource, for diagnostics.
    fn location(&self) -> &Path;

    /// Make sure the directory holding the resource exists.
    async fn ensure_location(&self) -> ChronicleResult<()>;

    /// Load the collection. A missing resource is an empty collection.
    async fn load(&self) -> ChronicleResult<Vec<Session>>;

    /// Replace the persisted collection with `sessions`.
    async fn save(&self, sessions: &[Session]) -> ChronicleResult<()>;

    /// Byte size of the persisted resource, `0` if it does not exist.
    async fn size_bytes(&self) -> ChronicleResult<u64>;
}

/// On-disk document shape: `{ "sessions": [...], "savedAt": "..." }`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCollection {
    sessions: Vec<Session>,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredCollectionRef<'a> {
    sessions: &'a [Session],
    saved_at: DateTime<Utc>,
}

/// JSON file adapter with temp-file + rename writes and an advisory lock.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    /// Create an adapter for the JSON document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, |name| format!("{name}.lock"))
    }
}

#[async_trait]
impl SessionPersistence for JsonFilePersistence {
    fn location(&self) -> &Path {
        &self.path
    }

    async fn ensure_location(&self) -> ChronicleResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ChronicleError::Persistence(format!(
                        "Failed to create storage directory '{}': {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(())
    }

    async fn load(&self) -> ChronicleResult<Vec<Session>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ChronicleError::Io(e)),
        };
        let data = String::from_utf8(bytes).map_err(|e| {
            ChronicleError::CorruptStorage(format!(
                "'{}' is not valid UTF-8: {e}",
                self.path.display()
            ))
        })?;
        parse_collection(&self.path, &data)
    }

    async fn save(&self, sessions: &[Session]) -> ChronicleResult<()> {
        let doc = StoredCollectionRef {
            sessions,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(|e| {
            ChronicleError::Persistence(format!("Failed to serialize sessions: {e}"))
        })?;

        let path = self.path.clone();
        let lock_path = self.lock_path();
        let bytes = json.len();
        tokio::task::spawn_blocking(move || write_atomically(&path, &lock_path, &json))
            .await
            .map_err(|e| ChronicleError::Persistence(format!("Write task failed: {e}")))??;

        debug!(
            path = %self.path.display(),
            sessions = sessions.len(),
            bytes,
            "Session collection written"
        );
        Ok(())
    }

    async fn size_bytes(&self) -> ChronicleResult<u64> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(ChronicleError::Io(e)),
        }
    }
}

/// Parse and validate a persisted document.
///
/// Blank content counts as an empty store; anything else that is not a
/// well-formed collection is [`ChronicleError::CorruptStorage`].
pub(crate) fn parse_collection(path: &Path, data: &str) -> ChronicleResult<Vec<Session>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }

    let doc: StoredCollection = serde_json::from_str(data).map_err(|e| {
        ChronicleError::CorruptStorage(format!(
            "'{}' is not a valid session file: {e}",
            path.display()
        ))
    })?;

    let mut seen = HashSet::with_capacity(doc.sessions.len());
    for session in &doc.sessions {
        if !seen.insert(session.id) {
            return Err(ChronicleError::CorruptStorage(format!(
                "'{}' contains duplicate session id {}",
                path.display(),
                session.id
            )));
        }
        if session.updated_at < session.created_at {
            return Err(ChronicleError::CorruptStorage(format!(
                "'{}': session {} was updated before it was created",
                path.display(),
                session.id
            )));
        }
    }

    Ok(doc.sessions)
}

fn sibling(path: &Path, name: impl FnOnce(&str) -> String) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("sessions.json");
    path.with_file_name(name(file_name))
}

/// Write `bytes` to a temp file next to `path`, fsync it, then rename it
/// over `path` while holding an exclusive lock on `lock_path`.
fn write_atomically(path: &Path, lock_path: &Path, bytes: &[u8]) -> ChronicleResult<()> {
    let write_err = |what: &str, e: std::io::Error| {
        ChronicleError::Persistence(format!("{what} '{}': {e}", path.display()))
    };

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(|e| write_err("Failed to open lock file for", e))?;
    FileExt::lock_exclusive(&lock).map_err(|e| write_err("Failed to lock", e))?;

    let tmp_path = sibling(path, |name| format!(".{name}.{}.tmp", Uuid::new_v4()));
    let result = (|| {
        let mut tmp =
            File::create(&tmp_path).map_err(|e| write_err("Failed to create temp file for", e))?;
        tmp.write_all(bytes)
            .map_err(|e| write_err("Failed to write temp file for", e))?;
        tmp.sync_all()
            .map_err(|e| write_err("Failed to sync temp file for", e))?;
        drop(tmp);
        fs::rename(&tmp_path, path).map_err(|e| write_err("Failed to replace", e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    let _ = FileExt::unlock(&lock);
    result
}
