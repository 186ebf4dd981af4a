use crate::config::AutoSaveConfig;
use crate::editor::EditorContext;
use crate::patterns::WatchPatterns;
use chrono::{DateTime, Utc};
use chronicle_core::{ChronicleError, ChronicleResult, Metadata, Role};
use chronicle_session::{NewMessage, NewSession, SessionStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Value of the `source` metadata key on everything autosave writes.
pub const AUTOSAVE_SOURCE: &str = "autosave";

/// Why a tick captured nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No document is focused.
    NoActiveDocument,
    /// The document has never been saved to a file.
    Untitled,
    /// The document has edits that were not saved yet.
    UnsavedChanges,
    /// The file lies outside every configured watch directory.
    OutsideWatchDirectories,
    /// The file name matches none of the watch patterns.
    PatternMismatch,
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was captured.
    Skipped(SkipReason),
    /// The active document was appended to the current session.
    Captured {
        /// Session the content went into.
        session_id: Uuid,
        /// Id of the appended message.
        message_id: Uuid,
        /// Whether this tick opened the session.
        new_session: bool,
    },
}

/// Point-in-time view of the scheduler, safe to take in any state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    /// Autosave is enabled in configuration.
    pub enabled: bool,
    /// The periodic loop is active.
    pub running: bool,
    /// Successful captures since construction.
    pub save_count: u64,
    /// Ticks that failed while capturing.
    pub failed_ticks: u64,
    /// Session the scheduler is appending to.
    pub current_session_id: Option<Uuid>,
    /// Instant of the last successful capture.
    pub last_save_time: Option<DateTime<Utc>>,
    /// Message of the most recent failure, cleared by the next success.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    save_count: u64,
    failed_ticks: u64,
    current_session_id: Option<Uuid>,
    last_save_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Inner {
    config: AutoSaveConfig,
    patterns: WatchPatterns,
    store: Arc<SessionStore>,
    editor: Arc<dyn EditorContext>,
    state: RwLock<SchedulerState>,
    /// Serializes ticks so two captures never overlap.
    tick_lock: Mutex<()>,
}

/// Timer-driven loop that appends the active document to a session.
///
/// The scheduler is either stopped or running; [`start`](Self::start) and
/// [`stop`](Self::stop) are the only operations that touch the loop handle,
/// so at most one loop exists per instance. Each tick is scheduled only after
/// the previous one finished, whatever its outcome, and tick failures are
/// recorded and logged rather than propagated.
pub struct AutoSaveScheduler {
    inner: Arc<Inner>,
    interval: Duration,
    running: Mutex<Option<LoopHandle>>,
}

impl AutoSaveScheduler {
    /// Build a stopped scheduler.
    ///
    /// Fails with [`ChronicleError::Config`] if the configuration is invalid.
    pub fn new(
        config: AutoSaveConfig,
        store: Arc<SessionStore>,
        editor: Arc<dyn EditorContext>,
    ) -> ChronicleResult<Self> {
        config.validate()?;
        let patterns = WatchPatterns::new(config.file_patterns.as_slice())?;
        let interval = config.interval_duration();
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                patterns,
                store,
                editor,
                state: RwLock::new(SchedulerState::default()),
                tick_lock: Mutex::new(()),
            }),
            interval,
            running: Mutex::new(None),
        })
    }

    /// Override the tick period derived from the configuration.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The active tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin the periodic loop. No-op if already running or disabled.
    ///
    /// Starting resets the scheduler-local current session, so the first
    /// capture after a (re)start opens a new session.
    pub async fn start(&self) {
        if !self.inner.config.enabled {
            info!("Autosave is disabled; not starting");
            return;
        }

        // Lock order is tick_lock, then running. status() only takes running.
        let _tick = self.inner.tick_lock.lock().await;
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|h| !h.task.is_finished()) {
            debug!("Autosave already running");
            return;
        }

        if !self.inner.store.is_initialized().await {
            warn!("Session store is not initialized; autosave ticks will fail until it is");
        }
        self.inner.state.write().await.current_session_id = None;

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(self.inner.clone(), self.interval, rx));
        *running = Some(LoopHandle { shutdown, task });

        info!(
            interval_secs = self.interval.as_secs_f64(),
            patterns = ?self.inner.patterns.patterns(),
            idle_timeout_minutes = self.inner.config.idle_timeout,
            "Autosave started"
        );
    }

    /// Cancel the pending tick. A tick already in progress completes, but no
    /// further tick is scheduled. No-op if stopped.
    pub async fn stop(&self) {
        let Some(handle) = self.running.lock().await.take() else {
            return;
        };
        let _ = handle.shutdown.send(true);
        info!("Autosave stopped");
    }

    /// Run one capture now, independent of the loop.
    pub async fn tick(&self) -> ChronicleResult<TickOutcome> {
        self.inner.tick().await
    }

    /// Snapshot of the scheduler state.
    pub async fn status(&self) -> SchedulerStatus {
        let running = self
            .running
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.task.is_finished());
        let state = self.inner.state.read().await;
        SchedulerStatus {
            enabled: self.inner.config.enabled,
            running,
            save_count: state.save_count,
            failed_ticks: state.failed_ticks,
            current_session_id: state.current_session_id,
            last_save_time: state.last_save_time,
            last_error: state.last_error.clone(),
        }
    }
}

async fn run_loop(inner: Arc<Inner>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
        // Failures are recorded in the scheduler state and logged by tick().
        let _ = inner.tick().await;
    }
    debug!("Autosave loop exited");
}

impl Inner {
    async fn tick(&self) -> ChronicleResult<TickOutcome> {
        let _tick = self.tick_lock.lock().await;

        let Some(doc) = self.editor.active_document().await else {
            return Ok(self.skip(SkipReason::NoActiveDocument, None));
        };
        let Some(path) = doc.path else {
            return Ok(self.skip(SkipReason::Untitled, None));
        };
        if doc.is_dirty {
            return Ok(self.skip(SkipReason::UnsavedChanges, Some(&path)));
        }
        if !self.within_watch_directories(&path) {
            return Ok(self.skip(SkipReason::OutsideWatchDirectories, Some(&path)));
        }
        if !self.patterns.matches(&path) {
            return Ok(self.skip(SkipReason::PatternMismatch, Some(&path)));
        }

        match self.capture(&path, doc.content).await {
            Ok(outcome) => {
                let mut state = self.state.write().await;
                state.save_count += 1;
                state.last_save_time = Some(Utc::now());
                state.last_error = None;
                Ok(outcome)
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.failed_ticks += 1;
                state.last_error = Some(e.to_string());
                if let ChronicleError::SessionNotFound(id) = &e {
                    if state.current_session_id == Some(*id) {
                        // The session vanished from the store; open a new one next time.
                        state.current_session_id = None;
                    }
                }
                warn!(path = %path.display(), error = %e, "Autosave tick failed");
                Err(e)
            }
        }
    }

    fn skip(&self, reason: SkipReason, path: Option<&Path>) -> TickOutcome {
        debug!(?reason, path = ?path, "Autosave tick skipped");
        TickOutcome::Skipped(reason)
    }

    fn within_watch_directories(&self, path: &Path) -> bool {
        let dirs = &self.config.watch_directories;
        dirs.is_empty() || dirs.iter().any(|dir| path.starts_with(dir))
    }

    async fn capture(&self, path: &Path, content: String) -> ChronicleResult<TickOutcome> {
        let current = self.state.read().await.current_session_id;
        let (session_id, new_session) = match current {
            Some(id) => (id, false),
            None => {
                let session = self.store.create_session(new_autosave_session()).await?;
                self.state.write().await.current_session_id = Some(session.id);
                info!(session_id = %session.id, "Autosave opened a new session");
                (session.id, true)
            }
        };

        let mut metadata = Metadata::new();
        metadata.insert("source".into(), AUTOSAVE_SOURCE.into());
        metadata.insert("filePath".into(), path.display().to_string().into());
        metadata.insert("capturedAt".into(), Utc::now().to_rfc3339().into());

        let message = self
            .store
            .add_message(
                session_id,
                NewMessage {
                    role: Role::User,
                    content,
                    metadata,
                },
            )
            .await?;

        debug!(
            %session_id,
            message_id = %message.id,
            path = %path.display(),
            "Autosave captured document"
        );
        Ok(TickOutcome::Captured {
            session_id,
            message_id: message.id,
            new_session,
        })
    }
}

fn new_autosave_session() -> NewSession {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), AUTOSAVE_SOURCE.into());
    NewSession {
        title: format!("Autosave {}", Utc::now().format("%Y-%m-%d %H:%M")),
        tags: vec![AUTOSAVE_SOURCE.to_string()],
        metadata,
    }
}
