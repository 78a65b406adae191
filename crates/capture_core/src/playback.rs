use std::{ops::ControlFlow, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use shared::domain::{Frame, WalkthroughSession};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::ticker::ScheduledTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSpeed {
    Fastest,
    Fast,
    #[default]
    Normal,
    Slow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported playback speed {0} ms (expected 250, 500, 1000 or 2000)")]
pub struct InvalidPlaybackSpeed(pub u64);

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 4] = [Self::Fastest, Self::Fast, Self::Normal, Self::Slow];

    pub fn as_millis(self) -> u64 {
        match self {
            Self::Fastest => 250,
            Self::Fast => 500,
            Self::Normal => 1_000,
            Self::Slow => 2_000,
        }
    }

    pub fn period(self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

impl TryFrom<u64> for PlaybackSpeed {
    type Error = InvalidPlaybackSpeed;

    fn try_from(millis: u64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|speed| speed.as_millis() == millis)
            .ok_or(InvalidPlaybackSpeed(millis))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub frame_index: usize,
    pub frame_count: usize,
    pub is_playing: bool,
    pub speed: PlaybackSpeed,
    pub progress: f64,
}

/// Frame cursor over a stored walkthrough. Manual navigation clamps at both
/// ends; timed playback stops and rewinds after the last frame.
#[derive(Debug, Clone)]
pub struct PlaybackController {
    session: WalkthroughSession,
    frame_index: usize,
    is_playing: bool,
    speed: PlaybackSpeed,
}

impl PlaybackController {
    pub fn new(session: WalkthroughSession) -> Self {
        Self {
            session,
            frame_index: 0,
            is_playing: false,
            speed: PlaybackSpeed::default(),
        }
    }

    pub fn session(&self) -> &WalkthroughSession {
        &self.session
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_count(&self) -> usize {
        self.session.frames.len()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.session.frames.get(self.frame_index)
    }

    pub fn can_go_next(&self) -> bool {
        self.frame_index + 1 < self.frame_count()
    }

    pub fn can_go_prev(&self) -> bool {
        self.frame_count() > 0 && self.frame_index > 0
    }

    pub fn next(&mut self) -> bool {
        if !self.can_go_next() {
            return false;
        }
        self.frame_index += 1;
        true
    }

    pub fn prev(&mut self) -> bool {
        if !self.can_go_prev() {
            return false;
        }
        self.frame_index -= 1;
        true
    }

    pub fn seek(&mut self, index: usize) -> usize {
        self.frame_index = index.min(self.frame_count().saturating_sub(1));
        self.frame_index
    }

    /// Returns the new playing state. An empty walkthrough never plays.
    pub fn toggle_playback(&mut self) -> bool {
        self.set_playing(!self.is_playing)
    }

    pub fn set_playing(&mut self, playing: bool) -> bool {
        self.is_playing = playing && self.frame_count() > 0;
        self.is_playing
    }

    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
    }

    /// One playback step. Returns whether playback continues.
    pub fn tick(&mut self) -> bool {
        if !self.is_playing {
            return false;
        }
        if self.frame_index + 1 >= self.frame_count() {
            self.frame_index = 0;
            self.is_playing = false;
            return false;
        }
        self.frame_index += 1;
        true
    }

    /// Percentage of the walkthrough shown so far; 0 for an empty one.
    pub fn progress(&self) -> f64 {
        let count = self.frame_count();
        if count == 0 {
            return 0.0;
        }
        (self.frame_index + 1) as f64 / count as f64 * 100.0
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            frame_index: self.frame_index,
            frame_count: self.frame_count(),
            is_playing: self.is_playing,
            speed: self.speed,
            progress: self.progress(),
        }
    }
}

/// A viewer's playback: the controller plus the ticker that drives it.
///
/// Any change to the playing flag or the speed cancels the running ticker and
/// arms a new one, so ticks never stack. Dropping the session cancels it.
pub struct PlaybackSession {
    controller: Arc<Mutex<PlaybackController>>,
    updates: Arc<watch::Sender<PlaybackSnapshot>>,
    ticker: Option<ScheduledTask>,
}

impl PlaybackSession {
    pub fn new(session: WalkthroughSession) -> Self {
        let controller = PlaybackController::new(session);
        let (updates, _) = watch::channel(controller.snapshot());
        Self {
            controller: Arc::new(Mutex::new(controller)),
            updates: Arc::new(updates),
            ticker: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.controller.lock().await.snapshot()
    }

    pub async fn current_frame(&self) -> Option<Frame> {
        self.controller.lock().await.current_frame().cloned()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(ScheduledTask::is_running)
    }

    pub async fn toggle_playback(&mut self) -> bool {
        let playing = self.controller.lock().await.toggle_playback();
        self.rearm().await;
        playing
    }

    pub async fn set_playing(&mut self, playing: bool) -> bool {
        let playing = self.controller.lock().await.set_playing(playing);
        self.rearm().await;
        playing
    }

    pub async fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.controller.lock().await.set_speed(speed);
        self.rearm().await;
    }

    pub async fn next(&self) -> bool {
        self.navigate(PlaybackController::next).await
    }

    pub async fn prev(&self) -> bool {
        self.navigate(PlaybackController::prev).await
    }

    pub async fn seek(&self, index: usize) -> usize {
        let mut controller = self.controller.lock().await;
        let index = controller.seek(index);
        self.updates.send_replace(controller.snapshot());
        index
    }

    /// Stops playback and releases the ticker.
    pub async fn stop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
        let mut controller = self.controller.lock().await;
        controller.set_playing(false);
        self.updates.send_replace(controller.snapshot());
    }

    async fn navigate(&self, step: fn(&mut PlaybackController) -> bool) -> bool {
        let mut controller = self.controller.lock().await;
        let moved = step(&mut controller);
        if moved {
            self.updates.send_replace(controller.snapshot());
        }
        moved
    }

    async fn rearm(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }

        let snapshot = self.controller.lock().await.snapshot();
        self.updates.send_replace(snapshot);
        if !snapshot.is_playing {
            return;
        }

        debug!("playback: ticking every {} ms", snapshot.speed.as_millis());
        let controller = Arc::clone(&self.controller);
        let updates = Arc::clone(&self.updates);
        self.ticker = Some(ScheduledTask::every(
            "playback",
            snapshot.speed.period(),
            move || {
                let controller = Arc::clone(&controller);
                let updates = Arc::clone(&updates);
                async move {
                    let mut controller = controller.lock().await;
                    let playing = controller.tick();
                    updates.send_replace(controller.snapshot());
                    if playing {
                        ControlFlow::Continue(())
                    } else {
                        ControlFlow::Break(())
                    }
                }
            },
        ));
    }
}

#[cfg(test)]
#[path = "tests/playback_tests.rs"]
mod tests;
