use super::*;
use crate::{
    camera::{CameraDevice, CapturedImage, SyntheticCamera},
    capture::CaptureState,
    haptics::NoHaptics,
};
use async_trait::async_trait;
use shared::error::{CaptureError, NoticeKind};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time;

struct BusyOnceCamera {
    calls: AtomicU32,
    inner: SyntheticCamera,
}

#[async_trait]
impl CameraDevice for BusyOnceCamera {
    fn name(&self) -> &str {
        "busy-once"
    }

    async fn take_photo(&self) -> Result<CapturedImage, CaptureError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(CaptureError::Device("sensor busy".into()));
        }
        self.inner.take_photo().await
    }
}

fn started_manager(camera: Arc<dyn CameraDevice>) -> (Arc<Mutex<CaptureSessionManager>>, SessionId) {
    let mut manager = CaptureSessionManager::new(camera, Arc::new(NoHaptics));
    let id = manager.start_capture_session().expect("start");
    (Arc::new(Mutex::new(manager)), id)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<CaptureEvent>) -> Vec<CaptureEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn completes_and_stops_after_total_steps() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_secs(21)).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 11);
    let captured = events
        .iter()
        .filter(|event| matches!(event, CaptureEvent::FrameCaptured { .. }))
        .count();
    assert_eq!(captured, 10);
    match events.last() {
        Some(CaptureEvent::Completed { session }) => {
            assert_eq!(session.frames.len(), 10);
            assert_eq!(session.current_step, 10);
            assert!(!session.is_active);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(!ticker.is_running());
    assert_eq!(manager.lock().await.state(), CaptureState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn first_frame_arrives_after_one_cadence() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_millis(1_900)).await;
    assert!(drain(&mut rx).is_empty());

    time::sleep(Duration::from_millis(200)).await;
    match drain(&mut rx).as_slice() {
        [CaptureEvent::FrameCaptured {
            current_step,
            total_steps,
            ..
        }] => {
            assert_eq!(*current_step, 1);
            assert_eq!(*total_steps, 10);
        }
        other => panic!("expected one frame, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_ticker_captures_no_orphan_frames() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_secs(5)).await;
    ticker.cancel();
    assert!(!ticker.is_running());
    time::sleep(Duration::from_secs(30)).await;

    assert_eq!(drain(&mut rx).len(), 2);
    let mut manager = manager.lock().await;
    assert_eq!(manager.current().expect("session").frames.len(), 2);
    let session = manager.stop_capture_session().expect("session");
    assert_eq!(session.current_step, 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_ticker_stops_capture() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, _rx) = mpsc::unbounded_channel();
    let ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_secs(3)).await;
    drop(ticker);
    time::sleep(Duration::from_secs(30)).await;

    assert_eq!(
        manager.lock().await.current().expect("session").frames.len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn ticker_ends_when_session_is_stopped_elsewhere() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_secs(3)).await;
    let stopped = manager
        .lock()
        .await
        .stop_capture_session()
        .expect("session");
    time::sleep(Duration::from_secs(3)).await;

    assert_eq!(stopped.frames.len(), 1);
    assert_eq!(drain(&mut rx).len(), 1);
    assert!(!ticker.is_running());
}

#[tokio::test(start_paused = true)]
async fn camera_errors_are_reported_and_retried() {
    let camera = Arc::new(BusyOnceCamera {
        calls: AtomicU32::new(0),
        inner: SyntheticCamera::new(),
    });
    let (manager, id) = started_manager(camera);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_secs(23)).await;

    let events = drain(&mut rx);
    let failures: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            CaptureEvent::CaptureFailed { notice, .. } => Some(notice),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, NoticeKind::Capture);
    assert!(matches!(
        events.last(),
        Some(CaptureEvent::Completed { session }) if session.frames.len() == 10
    ));
}

#[tokio::test(start_paused = true)]
async fn stale_ticker_never_touches_the_next_session() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_millis(2_100)).await;
    let first = manager.lock().await.stop_capture_session().expect("session");
    assert_eq!(first.frames.len(), 1);
    let second = manager.lock().await.start_capture_session().expect("restart");
    assert_ne!(second, id);

    time::sleep(Duration::from_millis(4_100)).await;

    let manager = manager.lock().await;
    let current = manager.current().expect("second session");
    assert_eq!(current.id, second);
    assert!(current.frames.is_empty());
    assert_eq!(current.current_step, 0);
    assert_eq!(drain(&mut rx).len(), 1);
    assert!(!ticker.is_running());
}

#[tokio::test(start_paused = true)]
async fn finish_recovers_a_session_completed_by_the_last_tick() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_secs(21)).await;
    assert_eq!(manager.lock().await.state(), CaptureState::Stopped);

    let session = ticker.finish(&manager, &mut rx).await.expect("completed session");
    assert_eq!(session.id, id);
    assert_eq!(session.frames.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn finish_stops_an_interrupted_session() {
    let (manager, id) = started_manager(Arc::new(SyntheticCamera::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ticker = AutoCapture::start(Arc::clone(&manager), id.clone(), DEFAULT_CAPTURE_CADENCE, tx);

    time::sleep(Duration::from_millis(4_100)).await;
    let session = ticker.finish(&manager, &mut rx).await.expect("partial session");
    assert_eq!(session.id, id);
    assert_eq!(session.frames.len(), 2);
    assert!(!session.is_active);

    time::sleep(Duration::from_secs(10)).await;
    assert!(manager.lock().await.current().is_none());
}
