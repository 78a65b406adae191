use super::*;
use crate::{MemoryBackend, SqliteBackend};
use chrono::{Duration, TimeZone};
use shared::domain::{Frame, FrameId, SessionMetadata};

fn session(id: &str, title: &str) -> WalkthroughSession {
    let created_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let frames = vec![Frame {
        id: FrameId::for_capture(1_700_000_000_000, 0),
        image_data: "data:image/svg+xml;base64,AA==".into(),
        timestamp: 1_700_000_000_000,
        position: None,
        orientation: None,
    }];
    WalkthroughSession {
        id: SessionId::from(id),
        title: title.into(),
        description: String::new(),
        metadata: SessionMetadata::from_frames("test-device", 1_700_000_000_000, &frames),
        frames,
        created_at,
        updated_at: created_at,
        is_uploaded: false,
        upload_progress: None,
        location: None,
    }
}

fn ids(sessions: &[WalkthroughSession]) -> Vec<&str> {
    sessions.iter().map(|s| s.id.as_str()).collect()
}

async fn memory_store() -> WalkthroughStore {
    WalkthroughStore::open(Arc::new(MemoryBackend::new())).await
}

#[tokio::test]
async fn new_sessions_are_listed_most_recent_first() {
    let store = memory_store().await;
    store.add_session(session("a", "Lobby")).await;
    store.add_session(session("b", "Stairs")).await;
    store.add_session(session("c", "Roof")).await;

    assert_eq!(ids(&store.sessions().await), vec!["c", "b", "a"]);
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn adding_an_existing_id_replaces_the_old_entry() {
    let store = memory_store().await;
    store.add_session(session("a", "Lobby")).await;
    store.add_session(session("b", "Stairs")).await;
    store.add_session(session("a", "Lobby again")).await;

    let sessions = store.sessions().await;
    assert_eq!(ids(&sessions), vec!["a", "b"]);
    assert_eq!(sessions[0].title, "Lobby again");
}

#[tokio::test]
async fn update_merges_fields_and_moves_updated_at_forward() {
    let store = memory_store().await;
    let original = session("a", "Lobby");
    store.add_session(original.clone()).await;

    assert!(
        store
            .update_session(&original.id, SessionPatch::details("Foyer", "front door"))
            .await
    );
    let first = store.get_session(&original.id).await.expect("session");
    assert_eq!(first.title, "Foyer");
    assert_eq!(first.description, "front door");
    assert!(first.updated_at >= first.created_at);

    assert!(
        store
            .update_session(&original.id, SessionPatch::upload_progress(40))
            .await
    );
    let second = store.get_session(&original.id).await.expect("session");
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(second.upload_progress, Some(40));
}

#[tokio::test]
async fn update_never_moves_updated_at_backwards() {
    let store = memory_store().await;
    let mut future = session("a", "Lobby");
    future.created_at = Utc::now() + Duration::days(1);
    future.updated_at = future.created_at + Duration::hours(1);
    let previous = future.updated_at;
    store.add_session(future).await;

    store
        .update_session(&SessionId::from("a"), SessionPatch::title("Foyer"))
        .await;
    let updated = store
        .get_session(&SessionId::from("a"))
        .await
        .expect("session");
    assert_eq!(updated.updated_at, previous);
}

#[tokio::test]
async fn update_of_unknown_id_leaves_list_unchanged() {
    let store = memory_store().await;
    store.add_session(session("a", "Lobby")).await;
    let before = store.sessions().await;

    assert!(
        !store
            .update_session(&SessionId::from("missing"), SessionPatch::title("x"))
            .await
    );
    assert_eq!(store.sessions().await, before);
}

#[tokio::test]
async fn delete_removes_exactly_one_entry_and_keeps_order() {
    let store = memory_store().await;
    for id in ["a", "b", "c", "d"] {
        store.add_session(session(id, id)).await;
    }

    assert!(store.delete_session(&SessionId::from("b")).await);
    assert_eq!(ids(&store.sessions().await), vec!["d", "c", "a"]);

    assert!(!store.delete_session(&SessionId::from("b")).await);
    assert_eq!(ids(&store.sessions().await), vec!["d", "c", "a"]);
}

#[tokio::test]
async fn get_session_misses_softly() {
    let store = memory_store().await;
    assert!(store.get_session(&SessionId::from("nope")).await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn mark_uploaded_is_one_way() {
    let store = memory_store().await;
    store.add_session(session("a", "Lobby")).await;
    let id = SessionId::from("a");

    assert!(store.mark_uploaded(&id).await);
    store
        .update_session(
            &id,
            SessionPatch {
                is_uploaded: Some(false),
                ..SessionPatch::default()
            },
        )
        .await;

    let stored = store.get_session(&id).await.expect("session");
    assert!(stored.is_uploaded);
    assert_eq!(stored.upload_progress, Some(100));
}

#[tokio::test]
async fn visible_list_matches_last_written_state_after_reopen() {
    let backend: Arc<dyn KeyValueBackend> =
        Arc::new(SqliteBackend::new("sqlite::memory:").await.expect("db"));
    let store = WalkthroughStore::open(Arc::clone(&backend)).await;

    store.add_session(session("a", "Lobby")).await;
    store.add_session(session("b", "Stairs")).await;
    store
        .update_session(&SessionId::from("a"), SessionPatch::title("Foyer"))
        .await;
    store.delete_session(&SessionId::from("b")).await;
    store.add_session(session("c", "Roof")).await;

    let visible = store.sessions().await;
    let reopened = WalkthroughStore::open(backend).await;
    assert_eq!(reopened.sessions().await, visible);
    assert_eq!(ids(&visible), vec!["c", "a"]);
    assert_eq!(visible[1].title, "Foyer");
}

#[tokio::test]
async fn unsupported_schema_version_falls_back_to_empty_catalog() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .save(WALKTHROUGHS_KEY, r#"{"schema_version":99,"sessions":[]}"#)
        .await
        .expect("seed");

    let store = WalkthroughStore::open(backend).await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn persisted_catalog_carries_schema_version() {
    let backend = Arc::new(MemoryBackend::new());
    let store = WalkthroughStore::open(backend.clone()).await;
    store.add_session(session("a", "Lobby")).await;

    let raw = backend
        .load(WALKTHROUGHS_KEY)
        .await
        .expect("load")
        .expect("written");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value["schema_version"], CATALOG_SCHEMA_VERSION);
    assert_eq!(value["sessions"][0]["id"], "a");
}

#[tokio::test]
async fn replace_all_keeps_first_of_duplicate_ids() {
    let store = memory_store().await;
    store
        .replace_all(vec![
            session("a", "first"),
            session("b", "Stairs"),
            session("a", "second"),
        ])
        .await;

    let sessions = store.sessions().await;
    assert_eq!(ids(&sessions), vec!["a", "b"]);
    assert_eq!(sessions[0].title, "first");

    store.clear().await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn upload_claim_is_granted_once() {
    let store = memory_store().await;
    store.add_session(session("a", "Lobby")).await;
    let id = SessionId::from("a");

    assert_eq!(store.claim_upload(&id).await, UploadClaim::Claimed);
    assert_eq!(
        store.get_session(&id).await.expect("session").upload_progress,
        Some(0)
    );
    assert_eq!(store.claim_upload(&id).await, UploadClaim::InProgress);

    store.mark_uploaded(&id).await;
    assert_eq!(store.claim_upload(&id).await, UploadClaim::AlreadyUploaded);
    assert_eq!(
        store.claim_upload(&SessionId::from("missing")).await,
        UploadClaim::NotFound
    );
}
