use super::*;
use chrono::Utc;
use shared::domain::{Frame, FrameId, NetworkStatus, SessionMetadata, WalkthroughSession};
use std::sync::Arc;
use storage::MemoryBackend;

fn session(id: &str) -> WalkthroughSession {
    let frames = vec![Frame {
        id: FrameId::for_capture(5_000, 0),
        image_data: "data:image/svg+xml;base64,AAAA".into(),
        timestamp: 5_000,
        position: None,
        orientation: None,
    }];
    let now = Utc::now();
    WalkthroughSession {
        id: SessionId::from(id),
        title: "Basement".into(),
        description: String::new(),
        metadata: SessionMetadata::from_frames("test", 5_000, &frames),
        frames,
        created_at: now,
        updated_at: now,
        is_uploaded: false,
        upload_progress: None,
        location: None,
    }
}

async fn fixture() -> (WalkthroughStore, NetworkStatusObserver, Uploader) {
    let store = WalkthroughStore::open(Arc::new(MemoryBackend::new())).await;
    store.add_session(session("w-1")).await;
    let network = NetworkStatusObserver::default();
    let uploader = Uploader::new(store.clone(), network.clone(), DEFAULT_UPLOAD_DELAY);
    (store, network, uploader)
}

#[tokio::test(start_paused = true)]
async fn upload_steps_progress_then_marks_uploaded() {
    let (store, _network, uploader) = fixture().await;
    let mut events = uploader.subscribe_events();
    let id = SessionId::from("w-1");

    let handle = uploader.upload(&id).await.expect("upload starts");
    time::sleep(Duration::from_millis(1_100)).await;
    let midway = store.get_session(&id).await.expect("session");
    assert_eq!(midway.upload_progress, Some(50));
    assert!(!midway.is_uploaded);

    handle.await.expect("upload task");
    let done = store.get_session(&id).await.expect("session");
    assert!(done.is_uploaded);
    assert_eq!(done.upload_progress, Some(100));

    let mut percents = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            UploadEvent::Progress { percent, .. } => percents.push(percent),
            UploadEvent::Finished { session_id } => assert_eq!(session_id, id),
        }
    }
    assert_eq!(percents, vec![25, 50, 75, 100]);
}

#[tokio::test]
async fn offline_uploads_are_refused() {
    let (store, network, uploader) = fixture().await;
    network.report(NetworkStatus::offline());

    let err = uploader
        .upload(&SessionId::from("w-1"))
        .await
        .expect_err("offline");
    assert_eq!(err, UploadError::Offline);
    assert_eq!(store.sessions().await[0].upload_progress, None);
}

#[tokio::test]
async fn unknown_and_finished_sessions_are_refused() {
    let (store, _network, uploader) = fixture().await;
    let missing = SessionId::from("nope");
    assert_eq!(
        uploader.upload(&missing).await.expect_err("missing"),
        UploadError::NotFound(missing)
    );

    let id = SessionId::from("w-1");
    store.mark_uploaded(&id).await;
    assert_eq!(
        uploader.upload(&id).await.expect_err("done"),
        UploadError::AlreadyUploaded(id)
    );
}

#[tokio::test(start_paused = true)]
async fn deleting_mid_upload_abandons_it() {
    let (store, _network, uploader) = fixture().await;
    let id = SessionId::from("w-1");
    let handle = uploader.upload(&id).await.expect("upload starts");

    time::sleep(Duration::from_millis(600)).await;
    assert!(store.delete_session(&id).await);
    handle.await.expect("upload task");

    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn second_upload_of_the_same_session_is_refused_while_running() {
    let (store, _network, uploader) = fixture().await;
    let id = SessionId::from("w-1");

    let first = uploader.upload(&id).await.expect("first upload starts");
    assert_eq!(
        uploader.upload(&id).await.expect_err("already running"),
        UploadError::InProgress(id.clone())
    );
    assert_eq!(
        uploader.clone().upload(&id).await.expect_err("clones share the store"),
        UploadError::InProgress(id.clone())
    );

    first.await.expect("upload task");
    assert!(store.get_session(&id).await.expect("session").is_uploaded);
    assert_eq!(
        uploader.upload(&id).await.expect_err("done"),
        UploadError::AlreadyUploaded(id)
    );
}
