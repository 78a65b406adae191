use serde::{Deserialize, Serialize};

use crate::{
    domain::{CaptureSession, FrameId, SessionId},
    error::Notice,
};

/// Progress reported by the auto-capture ticker to the capture screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CaptureEvent {
    FrameCaptured {
        session_id: SessionId,
        frame_id: FrameId,
        current_step: u32,
        total_steps: u32,
    },
    CaptureFailed {
        session_id: SessionId,
        notice: Notice,
    },
    Completed {
        session: CaptureSession,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UploadEvent {
    Progress {
        session_id: SessionId,
        percent: u8,
    },
    Finished {
        session_id: SessionId,
    },
}
