use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{CaptureSession, Frame, FrameId, SessionId},
    error::CaptureError,
};
use tracing::{debug, info, warn};

use crate::{camera::CameraDevice, haptics::HapticFeedback};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Active,
    Stopped,
}

/// Owns the walkthrough being captured until it is stopped and handed off.
pub struct CaptureSessionManager {
    camera: Arc<dyn CameraDevice>,
    haptics: Arc<dyn HapticFeedback>,
    state: CaptureState,
    session: Option<CaptureSession>,
    last_started_at: i64,
}

impl CaptureSessionManager {
    pub fn new(camera: Arc<dyn CameraDevice>, haptics: Arc<dyn HapticFeedback>) -> Self {
        Self {
            camera,
            haptics,
            state: CaptureState::Idle,
            session: None,
            last_started_at: i64::MIN,
        }
    }

    pub fn camera(&self) -> &dyn CameraDevice {
        self.camera.as_ref()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == CaptureState::Active
    }

    pub fn current(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Begins a new session. An active session must be stopped or discarded
    /// first; it is never replaced implicitly. Ids are unique per manager even
    /// when sessions start within the same millisecond.
    pub fn start_capture_session(&mut self) -> Result<SessionId, CaptureError> {
        if self.is_active() {
            return Err(CaptureError::AlreadyActive);
        }

        let started_at = Utc::now()
            .timestamp_millis()
            .max(self.last_started_at.saturating_add(1));
        self.last_started_at = started_at;
        let session = CaptureSession::new(SessionId::from_epoch_ms(started_at), started_at);
        let id = session.id.clone();
        info!(
            "capture: session started id={id} total_steps={}",
            session.total_steps
        );
        self.session = Some(session);
        self.state = CaptureState::Active;
        Ok(id)
    }

    /// Takes one photo and appends it. On error nothing changes and the call
    /// can be retried.
    pub async fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let session = match (&self.state, &self.session) {
            (CaptureState::Active, Some(session)) => session,
            _ => return Err(CaptureError::NotActive),
        };
        if session.is_complete() {
            return Err(CaptureError::StepLimitReached {
                total_steps: session.total_steps,
            });
        }
        let session_id = session.id.clone();

        let image = match self.camera.take_photo().await {
            Ok(image) => image,
            Err(err) => {
                warn!("capture: frame failed id={session_id}: {err}");
                return Err(err);
            }
        };

        let session = self.session.as_mut().ok_or(CaptureError::NotActive)?;
        let timestamp = Utc::now().timestamp_millis();
        let frame = Frame {
            id: FrameId::for_capture(timestamp, session.frames.len()),
            image_data: image.data_uri,
            timestamp,
            position: None,
            orientation: None,
        };
        session.frames.push(frame.clone());
        session.current_step += 1;
        debug!(
            "capture: frame {} id={} step={}/{}",
            frame.id, session.id, session.current_step, session.total_steps
        );

        if let Err(err) = self.haptics.impact().await {
            debug!("capture: haptic pulse failed: {err:#}");
        }

        Ok(frame)
    }

    /// Ends the active session and hands it to the caller. Returns `None` when
    /// nothing is being captured. An empty session is the caller's cue to
    /// discard it.
    pub fn stop_capture_session(&mut self) -> Option<CaptureSession> {
        if !self.is_active() {
            return None;
        }
        self.state = CaptureState::Stopped;
        let mut session = self.session.take()?;
        session.is_active = false;
        info!(
            "capture: session stopped id={} frames={}",
            session.id,
            session.frames.len()
        );
        Some(session)
    }

    /// Drops the active session without handing it off.
    pub fn discard_capture_session(&mut self) -> bool {
        match self.stop_capture_session() {
            Some(session) => {
                info!("capture: session discarded id={}", session.id);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "tests/capture_tests.rs"]
mod tests;
