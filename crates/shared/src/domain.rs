use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of frames a walkthrough collects before auto-capture completes.
pub const DEFAULT_TOTAL_STEPS: u32 = 10;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(FrameId);

impl SessionId {
    /// Session ids are derived from the wall clock at capture start.
    pub fn from_epoch_ms(epoch_ms: i64) -> Self {
        Self(format!("walkthrough-{epoch_ms}"))
    }
}

impl FrameId {
    /// The frame index disambiguates captures landing in the same millisecond.
    pub fn for_capture(timestamp_ms: i64, index: usize) -> Self {
        Self(format!("{timestamp_ms}-{index}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    /// Encoded image payload (a base64 data URI). Never inspected by the core.
    pub image_data: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl Frame {
    pub fn payload_size(&self) -> u64 {
        self.image_data.len() as u64
    }
}

/// In-progress walkthrough owned by the capture manager. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSession {
    pub id: SessionId,
    pub frames: Vec<Frame>,
    pub start_time: i64,
    pub is_active: bool,
    pub current_step: u32,
    pub total_steps: u32,
}

impl CaptureSession {
    pub fn new(id: SessionId, start_time: i64) -> Self {
        Self {
            id,
            frames: Vec::new(),
            start_time,
            is_active: true,
            current_step: 0,
            total_steps: DEFAULT_TOTAL_STEPS,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_step >= self.total_steps
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionMetadata {
    pub device_info: String,
    pub total_frames: usize,
    pub duration_ms: u64,
    pub total_size: u64,
}

impl SessionMetadata {
    pub fn from_frames(device_info: impl Into<String>, start_time: i64, frames: &[Frame]) -> Self {
        let duration_ms = frames
            .last()
            .map(|last| last.timestamp.saturating_sub(start_time).max(0) as u64)
            .unwrap_or(0);
        Self {
            device_info: device_info.into(),
            total_frames: frames.len(),
            duration_ms,
            total_size: frames.iter().map(Frame::payload_size).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkthroughSession {
    pub id: SessionId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub frames: Vec<Frame>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub metadata: SessionMetadata,
}

impl WalkthroughSession {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Merges `patch` into the session without touching `updated_at`.
    ///
    /// A blank title is ignored and `is_uploaded` never goes back to false.
    pub fn apply_patch(&mut self, patch: SessionPatch) {
        if let Some(title) = patch.title {
            let title = title.trim();
            if !title.is_empty() {
                self.title = title.to_string();
            }
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(frames) = patch.frames {
            self.metadata.total_frames = frames.len();
            self.metadata.total_size = frames.iter().map(Frame::payload_size).sum();
            self.frames = frames;
        }
        if let Some(is_uploaded) = patch.is_uploaded {
            self.is_uploaded |= is_uploaded;
        }
        if let Some(progress) = patch.upload_progress {
            self.upload_progress = Some(progress.min(100));
        }
        if let Some(location) = patch.location {
            self.location = Some(location);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}

/// Partial update for a stored session; `None` leaves the field as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<Frame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_uploaded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SessionMetadata>,
}

impl SessionPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn details(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn upload_progress(progress: u8) -> Self {
        Self {
            upload_progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn uploaded() -> Self {
        Self {
            is_uploaded: Some(true),
            upload_progress: Some(100),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Unknown,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub is_connected: bool,
    pub connection_type: ConnectionType,
}

impl NetworkStatus {
    pub fn online(connection_type: ConnectionType) -> Self {
        Self {
            is_connected: true,
            connection_type,
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            connection_type: ConnectionType::None,
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self {
            is_connected: true,
            connection_type: ConnectionType::Unknown,
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
