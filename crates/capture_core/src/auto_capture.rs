use std::{ops::ControlFlow, sync::Arc, time::Duration};

use shared::{
    domain::{CaptureSession, SessionId},
    error::Notice,
    events::CaptureEvent,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::{capture::CaptureSessionManager, ticker::ScheduledTask};

pub const DEFAULT_CAPTURE_CADENCE: Duration = Duration::from_secs(2);

/// Hands-free capture: one frame per tick until the session is full, then the
/// session is stopped and delivered as [`CaptureEvent::Completed`].
///
/// The ticker is bound to one session id. Once that session is stopped or
/// replaced it ends without touching the manager again. Dropping or cancelling
/// the ticker stops further captures, and a tick that is cancelled while
/// waiting on the camera never appends its frame.
pub struct AutoCapture {
    session_id: SessionId,
    task: ScheduledTask,
}

impl AutoCapture {
    pub fn start(
        manager: Arc<Mutex<CaptureSessionManager>>,
        session_id: SessionId,
        cadence: Duration,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        info!("auto-capture: ticking every {cadence:?} id={session_id}");
        let owner = session_id.clone();
        let task = ScheduledTask::every("auto-capture", cadence, move || {
            let manager = Arc::clone(&manager);
            let owner = owner.clone();
            let events = events.clone();
            async move { capture_tick(&manager, &owner, &events).await }
        });
        Self { session_id, task }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn cancel(&mut self) {
        self.task.cancel();
    }

    /// Cancels the ticker and hands back the captured session, whether the
    /// last tick already completed it or it is still active. Events left in
    /// `events` are consumed. A different session found in the manager is
    /// left alone.
    pub async fn finish(
        mut self,
        manager: &Mutex<CaptureSessionManager>,
        events: &mut mpsc::UnboundedReceiver<CaptureEvent>,
    ) -> Option<CaptureSession> {
        self.cancel();
        while let Ok(event) = events.try_recv() {
            if let CaptureEvent::Completed { session } = event {
                return Some(session);
            }
        }
        let mut manager = manager.lock().await;
        if manager
            .current()
            .is_some_and(|session| session.id == self.session_id)
        {
            manager.stop_capture_session()
        } else {
            None
        }
    }
}

async fn capture_tick(
    manager: &Mutex<CaptureSessionManager>,
    owner: &SessionId,
    events: &mpsc::UnboundedSender<CaptureEvent>,
) -> ControlFlow<()> {
    let mut manager = manager.lock().await;
    let Some(session) = manager
        .current()
        .filter(|session| manager.is_active() && &session.id == owner)
    else {
        debug!("auto-capture: session id={owner} no longer active, stopping ticker");
        return ControlFlow::Break(());
    };
    let session_id = session.id.clone();
    if session.is_complete() {
        complete(&mut manager, events);
        return ControlFlow::Break(());
    }

    match manager.capture_frame().await {
        Ok(frame) => {
            let Some(session) = manager.current() else {
                return ControlFlow::Break(());
            };
            let _ = events.send(CaptureEvent::FrameCaptured {
                session_id,
                frame_id: frame.id,
                current_step: session.current_step,
                total_steps: session.total_steps,
            });
            if session.is_complete() {
                complete(&mut manager, events);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        Err(err) if err.is_retryable() => {
            let _ = events.send(CaptureEvent::CaptureFailed {
                session_id,
                notice: Notice::from(&err),
            });
            ControlFlow::Continue(())
        }
        Err(err) => {
            warn!("auto-capture: stopping ticker id={session_id}: {err}");
            ControlFlow::Break(())
        }
    }
}

fn complete(manager: &mut CaptureSessionManager, events: &mpsc::UnboundedSender<CaptureEvent>) {
    if let Some(session) = manager.stop_capture_session() {
        info!(
            "auto-capture: completed id={} frames={}",
            session.id,
            session.frames.len()
        );
        let _ = events.send(CaptureEvent::Completed { session });
    }
}

#[cfg(test)]
#[path = "tests/auto_capture_tests.rs"]
mod tests;
