use std::time::Duration;

use shared::{
    domain::{SessionId, SessionPatch},
    error::UploadError,
    events::UploadEvent,
};
use storage::{UploadClaim, WalkthroughStore};
use tokio::{sync::broadcast, task::JoinHandle, time};
use tracing::{info, warn};

use crate::network::NetworkStatusObserver;

pub const DEFAULT_UPLOAD_DELAY: Duration = Duration::from_secs(2);
const PROGRESS_STEPS: u8 = 4;

/// Simulated upload. Progress is written to the store in equal steps spread
/// over `delay`, then the session is marked uploaded.
///
/// Uploads are detached: they cannot be cancelled and a failure is not retried.
#[derive(Clone)]
pub struct Uploader {
    store: WalkthroughStore,
    network: NetworkStatusObserver,
    delay: Duration,
    events: broadcast::Sender<UploadEvent>,
}

impl Uploader {
    pub fn new(store: WalkthroughStore, network: NetworkStatusObserver, delay: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            network,
            delay,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// Starts an upload. A session whose upload is already running is
    /// rejected with [`UploadError::InProgress`].
    pub async fn upload(&self, id: &SessionId) -> Result<JoinHandle<()>, UploadError> {
        if !self.network.is_online() {
            return Err(UploadError::Offline);
        }
        match self.store.claim_upload(id).await {
            UploadClaim::Claimed => {}
            UploadClaim::NotFound => return Err(UploadError::NotFound(id.clone())),
            UploadClaim::AlreadyUploaded => return Err(UploadError::AlreadyUploaded(id.clone())),
            UploadClaim::InProgress => return Err(UploadError::InProgress(id.clone())),
        }

        if let Some(session) = self.store.get_session(id).await {
            info!(
                "upload: starting id={id} frames={} bytes={}",
                session.frames.len(),
                session.metadata.total_size
            );
        }
        let uploader = self.clone();
        let id = id.clone();
        Ok(tokio::spawn(async move { uploader.run(id).await }))
    }

    async fn run(self, id: SessionId) {
        let step = self.delay / u32::from(PROGRESS_STEPS);
        for n in 1..PROGRESS_STEPS {
            time::sleep(step).await;
            let percent = n * (100 / PROGRESS_STEPS);
            if !self
                .store
                .update_session(&id, SessionPatch::upload_progress(percent))
                .await
            {
                warn!("upload: session vanished mid-upload id={id}");
                return;
            }
            let _ = self.events.send(UploadEvent::Progress {
                session_id: id.clone(),
                percent,
            });
        }

        time::sleep(step).await;
        if !self.store.mark_uploaded(&id).await {
            warn!("upload: session vanished before completion id={id}");
            return;
        }
        let _ = self.events.send(UploadEvent::Progress {
            session_id: id.clone(),
            percent: 100,
        });
        let _ = self.events.send(UploadEvent::Finished {
            session_id: id.clone(),
        });
        info!("upload: finished id={id}");
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
