//! Autosave for Chronicle.
//!
//! The [`AutoSaveScheduler`] periodically looks at the document the editor
//! has focused and, if it is saved and matches the configured watch
//! patterns, appends its content to the scheduler's current session through
//! the [`SessionStore`](chronicle_session::SessionStore).
//!
//! # Main types
//!
//! - [`AutoSaveConfig`]: `[auto_save]` settings: interval, patterns, directories.
//! - [`AutoSaveScheduler`]: Stopped/running capture loop with explicit start/stop.
//! - [`EditorContext`]: Seam to the host editor's active document.
//! - [`FsEditorContext`]: Filesystem-backed editor context used by the CLI.
//! - [`WatchPatterns`]: Compiled glob filter for eligible files.

/// Autosave configuration.
pub mod config;
/// Active-document sources.
pub mod editor;
/// Glob-style watch patterns.
pub mod patterns;
/// The capture loop.
pub mod scheduler;

pub use config::AutoSaveConfig;
pub use editor::{ActiveDocument, EditorContext, FsEditorContext};
pub use patterns::WatchPatterns;
pub use scheduler::{AutoSaveScheduler, SchedulerStatus, SkipReason, TickOutcome, AUTOSAVE_SOURCE};
