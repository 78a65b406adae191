use chrono::Utc;
use shared::{
    domain::{CaptureSession, Location, SessionMetadata, WalkthroughSession},
    error::ValidationError,
};

use crate::camera::CameraDevice;

/// What the user enters on the description screen after a capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDetails {
    pub title: String,
    pub description: String,
    pub location: Option<Location>,
}

impl SessionDetails {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            location: None,
        }
    }
}

pub fn device_info(camera: &dyn CameraDevice) -> String {
    format!(
        "{}-{} camera={}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        camera.name()
    )
}

/// Turns a stopped capture into the record kept by the store.
pub fn finalize_session(
    capture: CaptureSession,
    details: SessionDetails,
    device_info: &str,
) -> Result<WalkthroughSession, ValidationError> {
    if capture.frames.is_empty() {
        return Err(ValidationError::EmptyCapture(capture.id));
    }
    let title = details.title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }

    let now = Utc::now();
    Ok(WalkthroughSession {
        metadata: SessionMetadata::from_frames(device_info, capture.start_time, &capture.frames),
        id: capture.id,
        title: title.to_string(),
        description: details.description.trim().to_string(),
        frames: capture.frames,
        created_at: now,
        updated_at: now,
        is_uploaded: false,
        upload_progress: None,
        location: details.location,
    })
}

#[cfg(test)]
#[path = "tests/finalize_tests.rs"]
mod tests;
