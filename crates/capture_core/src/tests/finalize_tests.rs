use super::*;
use crate::camera::SyntheticCamera;
use shared::domain::{Frame, FrameId, SessionId};

fn capture_with_frames(count: usize) -> CaptureSession {
    let start = 10_000;
    let mut session = CaptureSession::new(SessionId::from_epoch_ms(start), start);
    for index in 0..count {
        let timestamp = start + 2_000 * (index as i64 + 1);
        session.frames.push(Frame {
            id: FrameId::for_capture(timestamp, index),
            image_data: "data:image/svg+xml;base64,QUJD".into(),
            timestamp,
            position: None,
            orientation: None,
        });
        session.current_step += 1;
    }
    session.is_active = false;
    session
}

#[test]
fn empty_capture_is_rejected_for_discard() {
    let capture = capture_with_frames(0);
    let id = capture.id.clone();
    let err = finalize_session(capture, SessionDetails::new("Hall", ""), "device")
        .expect_err("empty capture");
    assert_eq!(err, ValidationError::EmptyCapture(id));
}

#[test]
fn blank_title_is_rejected() {
    let err = finalize_session(capture_with_frames(2), SessionDetails::new("  ", ""), "device")
        .expect_err("blank title");
    assert_eq!(err, ValidationError::EmptyTitle);
}

#[test]
fn finalized_session_carries_frames_and_metadata() {
    let capture = capture_with_frames(3);
    let id = capture.id.clone();
    let session = finalize_session(
        capture,
        SessionDetails::new(" Garage ", " east wall "),
        "linux-x86_64",
    )
    .expect("session");

    assert_eq!(session.id, id);
    assert_eq!(session.title, "Garage");
    assert_eq!(session.description, "east wall");
    assert_eq!(session.frames.len(), 3);
    assert_eq!(session.metadata.total_frames, 3);
    assert_eq!(session.metadata.duration_ms, 6_000);
    assert_eq!(session.metadata.total_size, 3 * 30);
    assert_eq!(session.metadata.device_info, "linux-x86_64");
    assert!(!session.is_uploaded);
    assert_eq!(session.created_at, session.updated_at);
}

#[test]
fn device_info_names_the_camera() {
    let camera = SyntheticCamera::new();
    assert!(device_info(&camera).ends_with("camera=synthetic"));
}
