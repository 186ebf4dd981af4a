//! The editing context the scheduler captures from.
//!
//! The host editor is an external collaborator; the scheduler only sees it
//! through [`EditorContext`].

use crate::patterns::WatchPatterns;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Snapshot of the document currently focused in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDocument {
    /// Originating file. `None` for an untitled buffer.
    pub path: Option<PathBuf>,
    /// Full text of the document.
    pub content: String,
    /// The buffer has edits that were not saved yet.
    pub is_dirty: bool,
}

impl ActiveDocument {
    /// A saved document backed by `path`.
    pub fn saved(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            content: content.into(),
            is_dirty: false,
        }
    }
}

/// Source of the active document.
#[async_trait]
pub trait EditorContext: Send + Sync {
    /// The document currently being edited, if any.
    async fn active_document(&self) -> Option<ActiveDocument>;
}

/// Filesystem-backed editor context.
///
/// Treats on-disk content as the saved state: either a single pinned file, or
/// the most recently modified regular file directly inside one of the watch
/// directories whose name matches the watch patterns.
pub struct FsEditorContext {
    pinned: Option<PathBuf>,
    directories: Vec<PathBuf>,
    patterns: Option<WatchPatterns>,
}

impl FsEditorContext {
    /// Always report `path` as the active document.
    pub fn pinned(path: impl Into<PathBuf>) -> Self {
        Self {
            pinned: Some(path.into()),
            directories: Vec::new(),
            patterns: None,
        }
    }

    /// Report the most recently modified file in `directories` that matches
    /// `patterns`. Non-matching files never shadow an eligible one.
    pub fn most_recent_in(directories: Vec<PathBuf>, patterns: WatchPatterns) -> Self {
        Self {
            pinned: None,
            directories,
            patterns: Some(patterns),
        }
    }

    async fn most_recent_file(&self) -> Option<PathBuf> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for dir in &self.directories {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Skipping unreadable watch directory");
                    continue;
                }
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let path = entry.path();
                if self.patterns.as_ref().is_some_and(|p| !p.matches(&path)) {
                    continue;
                }
                let Ok(modified) = meta.modified() else {
                    continue;
                };
                if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                    newest = Some((modified, path));
                }
            }
        }
        newest.map(|(_, path)| path)
    }
}

#[async_trait]
impl EditorContext for FsEditorContext {
    async fn active_document(&self) -> Option<ActiveDocument> {
        let path = match &self.pinned {
            Some(path) => path.clone(),
            None => self.most_recent_file().await?,
        };
        read_document(&path).await
    }
}

async fn read_document(path: &Path) -> Option<ActiveDocument> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(ActiveDocument::saved(path, content)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Active document is not readable");
            None
        }
    }
}
