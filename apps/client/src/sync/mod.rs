//! Sync engine for replicating the local document store with the backend.

use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{DbError, PendingTombstone, StoredDocument, SyncRepository};
use crate::error::StoreError;
use crate::reconcile::ConflictReconciler;
use crate::store::{lock, EntityStore};
use vocab_core::replication::{
    PullRequest, PullResponse, PushDoc, PushRequest, PushResponse, RegisterRequest,
    RegisterResponse,
};
use vocab_core::{next_revision, EntityKind};

/// Documents pushed per request.
const PUSH_BATCH: usize = 200;
/// Changes pulled per request.
const PULL_LIMIT: i64 = 500;
const EVENT_CAPACITY: usize = 32;

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not authenticated - please register device first")]
    NotAuthenticated,

    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        Self::Database(err.to_string())
    }
}

/// Sync status snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncStatus {
    Idle,
    Syncing { stage: SyncStage, progress: f32 },
    Completed { synced_at: String, stats: SyncStats },
    Failed { error: String },
}

/// Current sync stage.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name")]
pub enum SyncStage {
    Connecting,
    PushingChanges { count: usize },
    PullingChanges { since: i64 },
    ApplyingChanges { count: usize },
    Reconciling,
    PushingMerges { count: usize },
}

/// Sync statistics.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub docs_pushed: usize,
    pub tombstones_pushed: usize,
    pub push_conflicts: usize,
    pub changes_pulled: usize,
    pub docs_written: usize,
    pub conflicts_stored: usize,
    pub merged: usize,
    pub orphaned: usize,
}

/// Live replication events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    Active,
    Change { docs_written: usize },
    Paused,
    Error { message: String },
    Complete,
}

/// Inner state shared across clones.
struct SyncEngineInner {
    client: Client,
    backend_url: String,
    store: EntityStore,
    reconciler: ConflictReconciler,
    status: Mutex<SyncStatus>,
    stats: Mutex<SyncStats>,
    events: broadcast::Sender<SyncEvent>,
    live: Mutex<Option<JoinHandle<()>>>,
}

/// Sync engine for managing replication.
///
/// Clone-able because all state lives behind an `Arc`; database locks are
/// never held across await points.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncEngineInner>,
}

/// Wire form of the pending local revisions and loser tombstones.
fn push_docs(pending: &[StoredDocument], tombstones: &[PendingTombstone]) -> Vec<PushDoc> {
    let revisions = pending.iter().map(|stored| PushDoc {
        id: stored.doc.id.clone(),
        rev: stored.doc.rev.clone(),
        parent_rev: stored.remote_rev.clone(),
        deleted: stored.doc.deleted,
        body: stored.doc.body.clone(),
    });
    let tombstones = tombstones.iter().map(|tombstone| PushDoc {
        id: tombstone.doc_id.clone(),
        rev: next_revision(Some(&tombstone.parent_rev), true, &Value::Null),
        parent_rev: Some(tombstone.parent_rev.clone()),
        deleted: true,
        body: Value::Null,
    });
    revisions.chain(tombstones).collect()
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(backend_url: &str, store: EntityStore, reconciler: ConflictReconciler) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SyncEngineInner {
                client: Client::new(),
                backend_url: backend_url.trim_end_matches('/').to_string(),
                store,
                reconciler,
                status: Mutex::new(SyncStatus::Idle),
                stats: Mutex::new(SyncStats::default()),
                events,
                live: Mutex::new(None),
            }),
        }
    }

    /// Get current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.status.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Check if backend is reachable.
    pub async fn check_connectivity(&self) -> Result<bool, SyncError> {
        let url = format!("{}/health", self.inner.backend_url);
        match self.inner.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => Err(SyncError::Network(e.to_string())),
        }
    }

    /// Register this device and store its token locally.
    pub async fn register_device(
        &self,
        name: Option<String>,
        account_id: Option<String>,
    ) -> Result<RegisterResponse, SyncError> {
        let request = RegisterRequest { name, account_id };
        let response: RegisterResponse = self.post("/api/device/register", None, &request).await?;

        lock(self.inner.store.repository()).save_device_token(
            &response.token,
            &response.device_id,
            &response.account_id,
        )?;
        info!(device = %response.device_id, account = %response.account_id, "device registered");
        Ok(response)
    }

    /// Stored device token.
    pub fn token(&self) -> Result<String, SyncError> {
        lock(self.inner.store.repository())
            .get_device_token()?
            .map(|device| device.token)
            .ok_or(SyncError::NotAuthenticated)
    }

    /// Push, pull, reconcile and push the merges once.
    pub async fn sync_once(&self) -> Result<SyncStats, SyncError> {
        // Check if sync already in progress
        {
            let mut current = self.inner.status.lock().await;
            if matches!(*current, SyncStatus::Syncing { .. }) {
                return Err(SyncError::AlreadyInProgress);
            }
            *current = SyncStatus::Syncing {
                stage: SyncStage::Connecting,
                progress: 0.0,
            };
        }
        *self.inner.stats.lock().await = SyncStats::default();

        match self.run_sync().await {
            Ok(stats) => Ok(stats),
            Err(err) => {
                warn!("sync failed: {}", err);
                self.set_status(SyncStatus::Failed {
                    error: err.to_string(),
                })
                .await;
                Err(err)
            }
        }
    }

    /// Run `sync_once` every `interval` until [`stop_live`](Self::stop_live).
    pub async fn start_live(&self, interval: Duration) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let _ = engine.inner.events.send(SyncEvent::Active);
                match engine.sync_once().await {
                    Ok(stats) => {
                        if stats.docs_written > 0 {
                            let _ = engine.inner.events.send(SyncEvent::Change {
                                docs_written: stats.docs_written,
                            });
                        }
                    }
                    Err(SyncError::AlreadyInProgress) => {}
                    Err(err) => {
                        let _ = engine.inner.events.send(SyncEvent::Error {
                            message: err.to_string(),
                        });
                    }
                }
                let _ = engine.inner.events.send(SyncEvent::Paused);
                tokio::time::sleep(interval).await;
            }
        });

        if let Some(previous) = self.inner.live.lock().await.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs(), "live sync started");
    }

    pub async fn stop_live(&self) {
        if let Some(handle) = self.inner.live.lock().await.take() {
            handle.abort();
            let _ = self.inner.events.send(SyncEvent::Complete);
            info!("live sync stopped");
        }
    }

    // === Private methods ===

    async fn run_sync(&self) -> Result<SyncStats, SyncError> {
        let token = self.token()?;

        // 1. Push local revisions and loser tombstones
        let (docs, tombstones) = self
            .push_pending(&token, |count| SyncStage::PushingChanges { count }, 0.1)
            .await?;
        {
            let mut stats = self.inner.stats.lock().await;
            stats.docs_pushed = docs;
            stats.tombstones_pushed = tombstones;
        }

        // 2. Pull and apply the changes feed
        let mut since = lock(self.inner.store.repository())
            .get_sync_state()?
            .last_remote_seq;
        loop {
            self.set_status(SyncStatus::Syncing {
                stage: SyncStage::PullingChanges { since },
                progress: 0.3,
            })
            .await;
            let page: PullResponse = self
                .post(
                    "/api/sync/pull",
                    Some(&token),
                    &PullRequest {
                        since,
                        limit: PULL_LIMIT,
                    },
                )
                .await?;

            self.set_status(SyncStatus::Syncing {
                stage: SyncStage::ApplyingChanges {
                    count: page.changes.len(),
                },
                progress: 0.5,
            })
            .await;
            let (written, conflicts) = {
                let repo = lock(self.inner.store.repository());
                let mut written = 0;
                let mut conflicts = 0;
                for change in &page.changes {
                    let applied = repo.apply_remote_change(change)?;
                    written += usize::from(applied.written);
                    conflicts += applied.conflicts;
                }
                repo.update_sync_state(page.last_seq, None)?;
                (written, conflicts)
            };
            {
                let mut stats = self.inner.stats.lock().await;
                stats.changes_pulled += page.changes.len();
                stats.docs_written += written;
                stats.conflicts_stored += conflicts;
            }
            debug!(since, last_seq = page.last_seq, changes = page.changes.len(), "pulled changes");

            let exhausted = (page.changes.len() as i64) < PULL_LIMIT || page.last_seq <= since;
            since = page.last_seq;
            if exhausted {
                break;
            }
        }

        // 3. Reconcile conflicts
        self.set_status(SyncStatus::Syncing {
            stage: SyncStage::Reconciling,
            progress: 0.7,
        })
        .await;
        for kind in EntityKind::ALL {
            let report = self.inner.reconciler.reconcile_all(kind)?;
            let mut stats = self.inner.stats.lock().await;
            stats.merged += report.merged;
            stats.orphaned += report.orphaned;
        }

        // 4. Push merges
        let (docs, tombstones) = self
            .push_pending(&token, |count| SyncStage::PushingMerges { count }, 0.9)
            .await?;
        {
            let mut stats = self.inner.stats.lock().await;
            stats.docs_pushed += docs;
            stats.tombstones_pushed += tombstones;
        }

        // 5. Update sync state
        let now = Utc::now().to_rfc3339();
        lock(self.inner.store.repository()).update_sync_state(since, Some(&now))?;

        let stats = self.inner.stats.lock().await.clone();
        info!(
            pushed = stats.docs_pushed,
            pulled = stats.changes_pulled,
            merged = stats.merged,
            "sync completed"
        );
        self.set_status(SyncStatus::Completed {
            synced_at: now,
            stats: stats.clone(),
        })
        .await;

        Ok(stats)
    }

    /// Push everything pending; returns pushed documents and tombstones.
    async fn push_pending(
        &self,
        token: &str,
        stage: impl Fn(usize) -> SyncStage,
        progress: f32,
    ) -> Result<(usize, usize), SyncError> {
        let mut docs_pushed = 0;
        let mut tombstones_pushed = 0;

        loop {
            let (pending, tombstones) = {
                let repo = lock(self.inner.store.repository());
                (repo.pending_documents(PUSH_BATCH)?, repo.pending_tombstones()?)
            };
            let docs = push_docs(&pending, &tombstones);
            if docs.is_empty() {
                break;
            }

            self.set_status(SyncStatus::Syncing {
                stage: stage(docs.len()),
                progress,
            })
            .await;
            let response: PushResponse = self
                .post("/api/sync/push", Some(token), &PushRequest { docs: docs.clone() })
                .await?;
            self.inner.stats.lock().await.push_conflicts += response.conflicted.len();

            let mut accepted_any = false;
            {
                let repo = lock(self.inner.store.repository());
                for stored in &pending {
                    if response.accepted.contains(&stored.doc.rev) {
                        repo.mark_pushed(&stored.doc.id, &stored.doc.rev)?;
                        docs_pushed += 1;
                        accepted_any = true;
                    }
                }
                for (tombstone, doc) in tombstones.iter().zip(&docs[pending.len()..]) {
                    if response.accepted.contains(&doc.rev) {
                        repo.clear_tombstone(&tombstone.doc_id, &tombstone.parent_rev)?;
                        tombstones_pushed += 1;
                        accepted_any = true;
                    }
                }
            }

            if !accepted_any || pending.len() < PUSH_BATCH {
                break;
            }
        }
        Ok((docs_pushed, tombstones_pushed))
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        request: &Req,
    ) -> Result<Resp, SyncError> {
        let url = format!("{}{}", self.inner.backend_url, path);

        let mut builder = self.inner.client.post(&url).json(request);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SyncError::Backend { status, message });
        }

        resp.json()
            .await
            .map_err(|e| SyncError::Parse(e.to_string()))
    }

    async fn set_status(&self, status: SyncStatus) {
        *self.inner.status.lock().await = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DocumentRepository;
    use serde_json::json;
    use vocab_core::document::generation;
    use vocab_core::Document;

    fn engine(url: &str) -> SyncEngine {
        let store = EntityStore::open_in_memory().unwrap();
        let reconciler = ConflictReconciler::new(store.clone());
        SyncEngine::new(url, store, reconciler)
    }

    #[test]
    fn push_docs_carry_parents_and_tombstones() {
        let pending = vec![StoredDocument {
            doc: Document {
                id: "word_1".into(),
                rev: "3-c".into(),
                deleted: false,
                body: json!({"type": "noun"}),
            },
            seq: 4,
            remote_rev: Some("2-b".into()),
            pending: true,
        }];
        let tombstones = vec![PendingTombstone {
            doc_id: "word_1".into(),
            parent_rev: "2-x".into(),
        }];
        let docs = push_docs(&pending, &tombstones);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].parent_rev.as_deref(), Some("2-b"));
        assert!(docs[1].deleted);
        assert_eq!(generation(&docs[1].rev), Some(3));
        assert_eq!(docs[1].parent_rev.as_deref(), Some("2-x"));
    }

    #[tokio::test]
    async fn sync_without_token_is_not_authenticated() {
        let engine = engine("http://127.0.0.1:9");
        assert!(matches!(engine.status().await, SyncStatus::Idle));
        let err = engine.sync_once().await.unwrap_err();
        assert!(matches!(err, SyncError::NotAuthenticated));
        assert!(matches!(engine.status().await, SyncStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn unreachable_backend_fails_with_network_error() {
        let engine = engine("http://127.0.0.1:9/");
        lock(engine.inner.store.repository())
            .save_device_token("token", "device", "account")
            .unwrap();
        lock(engine.inner.store.repository())
            .put_document("word_1", None, false, &json!({"type": "noun"}))
            .unwrap();

        let err = engine.sync_once().await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        // Nothing was acknowledged, so the document stays pending.
        let pending = lock(engine.inner.store.repository())
            .pending_documents(10)
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn live_sync_reports_errors_and_completion() {
        let engine = engine("http://127.0.0.1:9");
        let mut events = engine.subscribe();
        engine.start_live(Duration::from_secs(60)).await;

        assert_eq!(events.recv().await.unwrap(), SyncEvent::Active);
        assert!(matches!(events.recv().await.unwrap(), SyncEvent::Error { .. }));
        assert_eq!(events.recv().await.unwrap(), SyncEvent::Paused);

        engine.stop_live().await;
        assert_eq!(events.recv().await.unwrap(), SyncEvent::Complete);
    }
}
