use crate::persistence::{JsonFilePersistence, SessionPersistence};
use crate::session::Session;
use chrono::Utc;
use chronicle_core::{ChronicleError, ChronicleResult, Message, Metadata, Role};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for [`SessionStore::create_session`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSession {
    /// Human-readable label; must not be blank.
    pub title: String,
    /// Initial tags. Duplicates collapse.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque metadata stored with the session.
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewSession {
    /// A session with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Payload for [`SessionStore::add_message`].
///
/// The store assigns the message id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// Author role.
    pub role: Role,
    /// Captured text.
    pub content: String,
    /// Opaque metadata stored with the message.
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewMessage {
    /// A [`Role::User`] message with no metadata.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: Metadata::new(),
        }
    }
}

/// Filter for [`SessionStore::search_sessions`]. All fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive substring matched against titles and message bodies.
    pub keyword: Option<String>,
    /// A session matches if it carries at least one of these tags.
    pub tags: Option<Vec<String>>,
    /// Maximum number of results, applied after sorting.
    pub limit: Option<usize>,
}

/// Aggregate counts returned by [`SessionStore::get_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Number of sessions held.
    pub total_sessions: usize,
    /// Number of messages across all sessions.
    pub total_messages: usize,
    /// Size in bytes of the persisted resource (0 when absent).
    pub storage_size: u64,
}

/// Single source of truth for session data.
///
/// `initialize()` must complete before any other call. Every mutation is
/// persisted as a full-collection rewrite while the write lock is held; if
/// that write fails, the in-memory change is rolled back before the error is
/// returned, so memory and disk never diverge.
pub struct SessionStore {
    persistence: Arc<dyn SessionPersistence>,
    sessions: RwLock<Option<Vec<Session>>>,
}

impl SessionStore {
    /// Create a store over the given persistence adapter.
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            persistence,
            sessions: RwLock::new(None),
        }
    }

    /// Create a store backed by a JSON document at `path`.
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFilePersistence::new(path)))
    }

    /// Load the persisted collection. Calling it again is a no-op.
    ///
    /// On [`ChronicleError::CorruptStorage`] the store stays uninitialized and
    /// nothing is written to the damaged resource.
    pub async fn initialize(&self) -> ChronicleResult<()> {
        let mut guard = self.sessions.write().await;
        if guard.is_some() {
            return Ok(());
        }

        self.persistence.ensure_location().await?;
        let loaded = self.persistence.load().await.inspect_err(|e| {
            warn!(
                path = %self.persistence.location().display(),
                error = %e,
                "Failed to load sessions"
            );
        })?;

        info!(
            path = %self.persistence.location().display(),
            sessions = loaded.len(),
            "Session store initialized"
        );
        *guard = Some(loaded);
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub async fn is_initialized(&self) -> bool {
        self.sessions.read().await.is_some()
    }

    /// Create, persist and return a new empty session.
    pub async fn create_session(&self, options: NewSession) -> ChronicleResult<Session> {
        let title = options.title.trim();
        if title.is_empty() {
            return Err(ChronicleError::Validation(
                "session title must not be empty".to_string(),
            ));
        }

        let mut session = Session::new(title);
        session.tags.extend(options.tags);
        session.metadata = options.metadata;

        let mut guard = self.sessions.write().await;
        let sessions = guard.as_mut().ok_or(ChronicleError::NotInitialized)?;

        sessions.push(session.clone());
        if let Err(e) = self.persistence.save(sessions).await {
            sessions.pop();
            warn!(session_id = %session.id, error = %e, "Rolled back session creation");
            return Err(e);
        }

        info!(session_id = %session.id, title = %session.title, "Session created");
        Ok(session)
    }

    /// Append a message to an existing session and persist it.
    pub async fn add_message(
        &self,
        session_id: Uuid,
        message: NewMessage,
    ) -> ChronicleResult<Message> {
        let mut guard = self.sessions.write().await;
        let sessions = guard.as_mut().ok_or(ChronicleError::NotInitialized)?;
        let idx = sessions
            .iter()
            .position(|s| s.id == session_id)
            .ok_or(ChronicleError::SessionNotFound(session_id))?;

        let previous_updated_at = sessions[idx].updated_at;
        let stored = sessions[idx]
            .push_message(
                Message::new(message.role, message.content, Utc::now())
                    .with_metadata(message.metadata),
            )
            .clone();

        if let Err(e) = self.persistence.save(sessions).await {
            let session = &mut sessions[idx];
            session.messages.pop();
            session.updated_at = previous_updated_at;
            warn!(%session_id, error = %e, "Rolled back message append");
            return Err(e);
        }

        debug!(
            %session_id,
            message_id = %stored.id,
            role = %stored.role,
            bytes = stored.content.len(),
            "Message appended"
        );
        Ok(stored)
    }

    /// Sessions matching `query`, most recently updated first.
    pub async fn search_sessions(&self, query: SearchQuery) -> ChronicleResult<Vec<Session>> {
        let guard = self.sessions.read().await;
        let sessions = guard.as_ref().ok_or(ChronicleError::NotInitialized)?;

        let keyword = query
            .keyword
            .as_deref()
            .map(str::to_lowercase)
            .filter(|k| !k.is_empty());
        let tags = query.tags.filter(|t| !t.is_empty());

        let mut results: Vec<Session> = sessions
            .iter()
            .filter(|s| keyword.as_deref().map_or(true, |k| s.matches_keyword(k)))
            .filter(|s| tags.as_deref().map_or(true, |t| s.has_any_tag(t)))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    /// Look up one session by id.
    pub async fn get_session(&self, id: Uuid) -> ChronicleResult<Option<Session>> {
        let guard = self.sessions.read().await;
        let sessions = guard.as_ref().ok_or(ChronicleError::NotInitialized)?;
        Ok(sessions.iter().find(|s| s.id == id).cloned())
    }

    /// Aggregate counts plus the size of the persisted resource.
    pub async fn get_stats(&self) -> ChronicleResult<StoreStats> {
        let guard = self.sessions.read().await;
        let sessions = guard.as_ref().ok_or(ChronicleError::NotInitialized)?;
        Ok(StoreStats {
            total_sessions: sessions.len(),
            total_messages: sessions.iter().map(Session::message_count).sum(),
            storage_size: self.persistence.size_bytes().await?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory adapter whose writes can be made to fail on demand.
    #[derive(Default)]
    struct FlakyPersistence {
        fail_writes: AtomicBool,
        saves: AtomicUsize,
        stored: Mutex<Vec<Session>>,
    }

    #[async_trait]
    impl SessionPersistence for FlakyPersistence {
        fn location(&self) -> &Path {
            Path::new("memory://sessions")
        }

        async fn ensure_location(&self) -> ChronicleResult<()> {
            Ok(())
        }

        async fn load(&self) -> ChronicleResult<Vec<Session>> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn save(&self, sessions: &[Session]) -> ChronicleResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ChronicleError::Persistence("disk full".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = sessions.to_vec();
            Ok(())
        }

        async fn size_bytes(&self) -> ChronicleResult<u64> {
            Ok(0)
        }
    }

    async fn flaky_store() -> (SessionStore, Arc<FlakyPersistence>) {
        let backend = Arc::new(FlakyPersistence::default());
        let store = SessionStore::new(backend.clone());
        store.initialize().await.unwrap();
        (store, backend)
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let store = SessionStore::new(Arc::new(FlakyPersistence::default()));
        assert!(!store.is_initialized().await);

        let err = store
            .create_session(NewSession::titled("T"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChronicleError::NotInitialized));
        assert!(matches!(
            store.add_message(Uuid::new_v4(), NewMessage::user("x")).await,
            Err(ChronicleError::NotInitialized)
        ));
        assert!(matches!(
            store.search_sessions(SearchQuery::default()).await,
            Err(ChronicleError::NotInitialized)
        ));
        assert!(matches!(
            store.get_session(Uuid::new_v4()).await,
            Err(ChronicleError::NotInitialized)
        ));
        assert!(matches!(
            store.get_stats().await,
            Err(ChronicleError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_create_session_rolls_back_on_write_failure() {
        let (store, backend) = flaky_store().await;
        backend.fail_writes.store(true, Ordering::SeqCst);

        let err = store
            .create_session(NewSession::titled("doomed"))
            .await
            .unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(store.get_stats().await.unwrap().total_sessions, 0);

        backend.fail_writes.store(false, Ordering::SeqCst);
        store.create_session(NewSession::titled("ok")).await.unwrap();
        assert_eq!(store.get_stats().await.unwrap().total_sessions, 1);
    }

    #[tokio::test]
    async fn test_add_message_rolls_back_on_write_failure() {
        let (store, backend) = flaky_store().await;
        let session = store
            .create_session(NewSession::titled("T"))
            .await
            .unwrap();
        store
            .add_message(session.id, NewMessage::user("first"))
            .await
            .unwrap();
        let before = store.get_session(session.id).await.unwrap().unwrap();

        backend.fail_writes.store(true, Ordering::SeqCst);
        let err = store
            .add_message(session.id, NewMessage::user("second"))
            .await
            .unwrap_err();
        assert!(err.is_persistence());

        let after = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(backend.stored.lock().unwrap()[0], before);
    }

    #[tokio::test]
    async fn test_add_message_unknown_session() {
        let (store, backend) = flaky_store().await;
        let missing = Uuid::new_v4();
        let err = store
            .add_message(missing, NewMessage::user("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChronicleError::SessionNotFound(id) if id == missing));
        assert_eq!(backend.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_title_is_rejected() {
        let (store, backend) = flaky_store().await;
        let err = store
            .create_session(NewSession::titled("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ChronicleError::Validation(_)));
        assert_eq!(backend.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_twice_does_not_reload() {
        let (store, backend) = flaky_store().await;
        store.create_session(NewSession::titled("kept")).await.unwrap();

        // Anything the backend holds now must not replace memory on a second call.
        backend.stored.lock().unwrap().clear();
        store.initialize().await.unwrap();
        assert_eq!(store.get_stats().await.unwrap().total_sessions, 1);
    }

    #[tokio::test]
    async fn test_search_limit_applies_after_sort() {
        let (store, _backend) = flaky_store().await;
        let mut ids = Vec::new();
        for i in 0..4 {
            let s = store
                .create_session(NewSession::titled(format!("s{i}")))
                .await
                .unwrap();
            ids.push(s.id);
        }
        // Touch the oldest session so it becomes the most recent.
        store
            .add_message(ids[0], NewMessage::user("bump"))
            .await
            .unwrap();

        let results = store
            .search_sessions(SearchQuery {
                limit: Some(2),
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_tags_are_deduplicated() {
        let (store, _backend) = flaky_store().await;
        let session = store
            .create_session(NewSession {
                title: "tags".into(),
                tags: vec!["x".into(), "y".into(), "x".into()],
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
        assert_eq!(session.tags.len(), 2);
    }
}
