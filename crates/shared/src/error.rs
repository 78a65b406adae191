use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Persistence,
    Capture,
    NotFound,
    Validation,
    Network,
}

/// User-facing, non-blocking notification for a recoverable failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("a capture session is already active")]
    AlreadyActive,
    #[error("no capture session is active")]
    NotActive,
    #[error("capture session already holds all {total_steps} frames")]
    StepLimitReached { total_steps: u32 },
    #[error("camera device failed: {0}")]
    Device(String),
    #[error("camera did not return an image within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl CaptureError {
    /// Device-side failures leave the session untouched and may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Device(_) | Self::Timeout { .. })
    }
}

impl From<&CaptureError> for Notice {
    fn from(value: &CaptureError) -> Self {
        Notice::new(NoticeKind::Capture, format!("Capture failed: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("walkthrough title must not be empty")]
    EmptyTitle,
    #[error("capture session {0} has no frames")]
    EmptyCapture(SessionId),
}

impl From<&ValidationError> for Notice {
    fn from(value: &ValidationError) -> Self {
        Notice::new(NoticeKind::Validation, value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("upload requires a network connection")]
    Offline,
    #[error("walkthrough {0} not found")]
    NotFound(SessionId),
    #[error("walkthrough {0} is already uploaded")]
    AlreadyUploaded(SessionId),
    #[error("walkthrough {0} is already being uploaded")]
    InProgress(SessionId),
}

impl From<&UploadError> for Notice {
    fn from(value: &UploadError) -> Self {
        let kind = match value {
            UploadError::Offline => NoticeKind::Network,
            UploadError::NotFound(_) => NoticeKind::NotFound,
            UploadError::AlreadyUploaded(_) | UploadError::InProgress(_) => NoticeKind::Validation,
        };
        Notice::new(kind, value.to_string())
    }
}
