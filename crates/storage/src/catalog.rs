use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::domain::{SessionId, SessionPatch, WalkthroughSession};
use tracing::{debug, info, warn};

use crate::{KeyValueBackend, LocalStore};

pub const WALKTHROUGHS_KEY: &str = "walkthroughs";
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

/// Persisted form of the walkthrough list, most recent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCatalog")]
pub struct SessionCatalog {
    pub schema_version: u32,
    pub sessions: Vec<WalkthroughSession>,
}

impl Default for SessionCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SessionCatalog {
    pub fn new(sessions: Vec<WalkthroughSession>) -> Self {
        Self {
            schema_version: CATALOG_SCHEMA_VERSION,
            sessions,
        }
    }
}

#[derive(Deserialize)]
struct RawCatalog {
    schema_version: u32,
    #[serde(default)]
    sessions: Vec<WalkthroughSession>,
}

impl TryFrom<RawCatalog> for SessionCatalog {
    type Error = String;

    fn try_from(raw: RawCatalog) -> Result<Self, Self::Error> {
        if raw.schema_version != CATALOG_SCHEMA_VERSION {
            return Err(format!(
                "unsupported walkthrough catalog schema_version {} (expected {CATALOG_SCHEMA_VERSION})",
                raw.schema_version
            ));
        }
        Ok(Self {
            schema_version: raw.schema_version,
            sessions: raw.sessions,
        })
    }
}

/// Outcome of [`WalkthroughStore::claim_upload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadClaim {
    /// Progress was set to 0; the caller now owns the upload.
    Claimed,
    NotFound,
    AlreadyUploaded,
    /// Progress is recorded but the session is not uploaded yet.
    InProgress,
}

/// Completed walkthroughs, backed by a single [`LocalStore`] key.
///
/// Every mutation rewrites the whole list. Lookups are linear scans; missing
/// ids are soft failures reported as `false`/`None`.
#[derive(Clone)]
pub struct WalkthroughStore {
    cell: Arc<LocalStore<SessionCatalog>>,
}

impl WalkthroughStore {
    pub async fn open(backend: Arc<dyn KeyValueBackend>) -> Self {
        let cell = LocalStore::open(backend, WALKTHROUGHS_KEY, SessionCatalog::default()).await;
        Self {
            cell: Arc::new(cell),
        }
    }

    pub async fn sessions(&self) -> Vec<WalkthroughSession> {
        self.cell.get().await.sessions
    }

    pub async fn len(&self) -> usize {
        self.cell.get().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get_session(&self, id: &SessionId) -> Option<WalkthroughSession> {
        self.cell
            .get()
            .await
            .sessions
            .into_iter()
            .find(|session| &session.id == id)
    }

    /// Prepends `session`. An older entry with the same id is dropped.
    pub async fn add_session(&self, session: WalkthroughSession) {
        let id = session.id.clone();
        self.cell
            .modify(|catalog| {
                let before = catalog.sessions.len();
                catalog.sessions.retain(|existing| existing.id != session.id);
                if catalog.sessions.len() != before {
                    warn!("walkthrough store: replacing existing session id={id}");
                }
                catalog.sessions.insert(0, session);
                true
            })
            .await;
        info!("walkthrough store: added session id={id}");
    }

    pub async fn update_session(&self, id: &SessionId, patch: SessionPatch) -> bool {
        let updated = self
            .cell
            .modify(|catalog| {
                let Some(session) = catalog.sessions.iter_mut().find(|s| &s.id == id) else {
                    return false;
                };
                session.apply_patch(patch);
                session.updated_at = Utc::now()
                    .max(session.updated_at)
                    .max(session.created_at);
                true
            })
            .await;
        if !updated {
            debug!("walkthrough store: update ignored, unknown session id={id}");
        }
        updated
    }

    pub async fn delete_session(&self, id: &SessionId) -> bool {
        let deleted = self
            .cell
            .modify(|catalog| {
                let before = catalog.sessions.len();
                catalog.sessions.retain(|session| &session.id != id);
                catalog.sessions.len() != before
            })
            .await;
        if deleted {
            info!("walkthrough store: deleted session id={id}");
        } else {
            debug!("walkthrough store: delete ignored, unknown session id={id}");
        }
        deleted
    }

    pub async fn mark_uploaded(&self, id: &SessionId) -> bool {
        self.update_session(id, SessionPatch::uploaded()).await
    }

    /// Marks `id` as uploading unless it is missing, done, or already in
    /// flight. Check and mark happen under one lock, so concurrent callers
    /// cannot both claim the same session.
    pub async fn claim_upload(&self, id: &SessionId) -> UploadClaim {
        let mut claim = UploadClaim::NotFound;
        self.cell
            .modify(|catalog| {
                let Some(session) = catalog.sessions.iter_mut().find(|s| &s.id == id) else {
                    return false;
                };
                claim = if session.is_uploaded {
                    UploadClaim::AlreadyUploaded
                } else if session.upload_progress.is_some() {
                    UploadClaim::InProgress
                } else {
                    session.apply_patch(SessionPatch::upload_progress(0));
                    session.updated_at = Utc::now().max(session.updated_at);
                    UploadClaim::Claimed
                };
                claim == UploadClaim::Claimed
            })
            .await;
        debug!("walkthrough store: upload claim id={id} -> {claim:?}");
        claim
    }

    /// Overwrites the whole list, keeping the first occurrence of each id.
    pub async fn replace_all(&self, sessions: Vec<WalkthroughSession>) {
        let mut unique: Vec<WalkthroughSession> = Vec::with_capacity(sessions.len());
        for session in sessions {
            if unique.iter().any(|existing| existing.id == session.id) {
                warn!("walkthrough store: dropping duplicate session id={}", session.id);
                continue;
            }
            unique.push(session);
        }
        self.cell.set(SessionCatalog::new(unique)).await;
    }

    pub async fn clear(&self) {
        self.cell.reset().await;
    }

    pub async fn flush(&self) -> Result<()> {
        self.cell.flush().await
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
