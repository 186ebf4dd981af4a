#![allow(clippy::unwrap_used, clippy::expect_used)]

use chronicle_core::{ChronicleError, Metadata, Role};
use chronicle_session::{
    JsonFilePersistence, NewMessage, NewSession, SearchQuery, SessionPersistence, SessionStore,
};
use std::path::PathBuf;
use uuid::Uuid;

/// Helper: an initialized JSON-backed store in a temp directory.
async fn temp_store() -> (SessionStore, PathBuf, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("store").join("sessions.json");
    let store = SessionStore::json_file(&path);
    store.initialize().await.unwrap();
    (store, path, tmp)
}

fn tagged(title: &str, tags: &[&str]) -> NewSession {
    NewSession {
        title: title.to_string(),
        tags: tags.iter().map(ToString::to_string).collect(),
        metadata: Metadata::new(),
    }
}

#[tokio::test]
async fn test_create_and_retrieve_by_tag() {
    let (store, _path, _tmp) = temp_store().await;

    let session = store.create_session(tagged("T", &["x"])).await.unwrap();
    assert!(session.messages.is_empty());
    assert_eq!(session.created_at, session.updated_at);

    let found = store
        .search_sessions(SearchQuery {
            tags: Some(vec!["x".into()]),
            ..SearchQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, session.id);

    let by_id = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(by_id, session);
    assert!(store.get_session(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_keyword_match() {
    let (store, _path, _tmp) = temp_store().await;
    let session = store
        .create_session(NewSession::titled("Debugging"))
        .await
        .unwrap();
    store
        .add_message(session.id, NewMessage::user("fix the bug"))
        .await
        .unwrap();
    store
        .create_session(NewSession::titled("Unrelated"))
        .await
        .unwrap();

    let keyword = |k: &str| SearchQuery {
        keyword: Some(k.to_string()),
        ..SearchQuery::default()
    };

    let hits = store.search_sessions(keyword("bug")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, session.id);

    // Case-insensitive, and the title counts too.
    let hits = store.search_sessions(keyword("FIX THE")).await.unwrap();
    assert_eq!(hits.len(), 1);
    let hits = store.search_sessions(keyword("unrel")).await.unwrap();
    assert_eq!(hits.len(), 1);

    assert!(store.search_sessions(keyword("zzz")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tag_filter_is_any_of() {
    let (store, _path, _tmp) = temp_store().await;
    store.create_session(tagged("a", &["rust"])).await.unwrap();
    store.create_session(tagged("b", &["docs"])).await.unwrap();
    store.create_session(tagged("c", &["misc"])).await.unwrap();

    let hits = store
        .search_sessions(SearchQuery {
            tags: Some(vec!["rust".into(), "docs".into()]),
            ..SearchQuery::default()
        })
        .await
        .unwrap();
    let mut titles: Vec<_> = hits.iter().map(|s| s.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, vec!["a", "b"]);
}

#[tokio::test]
async fn test_append_monotonicity() {
    let (store, _path, _tmp) = temp_store().await;
    let session = store
        .create_session(NewSession::titled("Monotonic"))
        .await
        .unwrap();

    let mut last_len = 0;
    let mut last_updated = session.updated_at;
    for i in 0..5 {
        let msg = store
            .add_message(session.id, NewMessage::user(format!("edit {i}")))
            .await
            .unwrap();
        let current = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(current.messages.len(), last_len + 1);
        assert!(current.updated_at >= last_updated);
        assert_eq!(current.updated_at, msg.timestamp);
        assert!(current.updated_at >= current.created_at);
        last_len = current.messages.len();
        last_updated = current.updated_at;
    }

    let current = store.get_session(session.id).await.unwrap().unwrap();
    assert!(current
        .messages
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_search_ordering_recent_first() {
    let (store, _path, _tmp) = temp_store().await;
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            store
                .create_session(NewSession::titled(format!("session {i}")))
                .await
                .unwrap()
                .id,
        );
    }
    store
        .add_message(ids[2], NewMessage::user("touched"))
        .await
        .unwrap();

    let results = store.search_sessions(SearchQuery::default()).await.unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[0].id, ids[2]);
    assert!(results
        .windows(2)
        .all(|w| w[0].updated_at >= w[1].updated_at));
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let (store, path, _tmp) = temp_store().await;
    let session = store
        .create_session(tagged("Persistent", &["keep"]))
        .await
        .unwrap();
    let mut metadata = Metadata::new();
    metadata.insert("filePath".into(), serde_json::json!("/tmp/notes.md"));
    store
        .add_message(
            session.id,
            NewMessage {
                role: Role::Assistant,
                content: "answer".into(),
                metadata,
            },
        )
        .await
        .unwrap();
    let expected = store.get_session(session.id).await.unwrap().unwrap();

    let reopened = SessionStore::json_file(&path);
    reopened.initialize().await.unwrap();
    let loaded = reopened.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(loaded, expected);
    assert_eq!(loaded.messages[0].metadata["filePath"], "/tmp/notes.md");
}

#[tokio::test]
async fn test_round_trip_preserves_semantic_content() {
    let (store, path, _tmp) = temp_store().await;
    let session = store.create_session(tagged("RT", &["a", "b"])).await.unwrap();
    store
        .add_message(session.id, NewMessage::user("one"))
        .await
        .unwrap();

    let adapter = JsonFilePersistence::new(&path);
    let first = adapter.load().await.unwrap();
    adapter.save(&first).await.unwrap();
    let second = adapter.load().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_idempotent_initialize() {
    let (store, path, _tmp) = temp_store().await;
    store
        .create_session(NewSession::titled("once"))
        .await
        .unwrap();

    let fresh = SessionStore::json_file(&path);
    fresh.initialize().await.unwrap();
    let once = fresh.search_sessions(SearchQuery::default()).await.unwrap();
    fresh.initialize().await.unwrap();
    let twice = fresh.search_sessions(SearchQuery::default()).await.unwrap();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_corrupt_storage_is_reported_and_left_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("sessions.json");
    let garbage = r#"{"sessions": [{"title": "no id"}], "savedAt": "2024-01-01T00:00:00Z"}"#;
    std::fs::write(&path, garbage).unwrap();

    let err = JsonFilePersistence::new(&path).load().await.unwrap_err();
    assert!(matches!(err, ChronicleError::CorruptStorage(_)), "{err}");

    let store = SessionStore::json_file(&path);
    let err = store.initialize().await.unwrap_err();
    assert!(matches!(err, ChronicleError::CorruptStorage(_)));
    assert!(!store.is_initialized().await);
    assert!(matches!(
        store.create_session(NewSession::titled("nope")).await,
        Err(ChronicleError::NotInitialized)
    ));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), garbage);
}

#[tokio::test]
async fn test_stats() {
    let (store, path, _tmp) = temp_store().await;
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_sessions, 0);
    assert_eq!(stats.total_messages, 0);
    assert_eq!(stats.storage_size, 0);
    assert!(!path.exists());

    let a = store.create_session(NewSession::titled("a")).await.unwrap();
    store.create_session(NewSession::titled("b")).await.unwrap();
    store.add_message(a.id, NewMessage::user("1")).await.unwrap();
    store.add_message(a.id, NewMessage::user("2")).await.unwrap();

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.storage_size, std::fs::metadata(&path).unwrap().len());
}

#[tokio::test]
async fn test_write_failure_keeps_memory_consistent() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("store");
    let store = SessionStore::json_file(dir.join("sessions.json"));
    store.initialize().await.unwrap();
    let session = store
        .create_session(NewSession::titled("fragile"))
        .await
        .unwrap();

    // Pull the directory out from under the store so the next write fails.
    std::fs::remove_dir_all(&dir).unwrap();

    let err = store
        .add_message(session.id, NewMessage::user("lost"))
        .await
        .unwrap_err();
    assert!(err.is_persistence(), "{err}");
    let current = store.get_session(session.id).await.unwrap().unwrap();
    assert!(current.messages.is_empty());
    assert_eq!(current.updated_at, session.updated_at);
}
