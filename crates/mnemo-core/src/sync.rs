//! Reconciliation between the local store and a remote document provider.
//!
//! # Pull
//!
//! A sync cycle moves through `Idle → Pulling → Applying → Idle`:
//!
//! 1. **Pulling**: ask the provider for the change feed since the cursor
//!    stored under the provider's name.
//! 2. **Applying**: for each [`ChangeRecord`]:
//!    - `removed`: delete the local document mapped to the remote ref
//!      (logged no-op when there is none);
//!    - otherwise: skip folder entries, read the full remote body, and
//!      upsert it under the local id mapped to the ref (a fresh UUID on
//!      first sight). Remote content always wins.
//! 3. The new cursor is stored only when every record applied, so failed
//!    records are retried next time. Re-applying a record is harmless.
//!
//! # Push
//!
//! [`SyncEngine::push`] runs after a local save: documents without a remote
//! ref are created remotely and linked, linked ones are updated. Failures are
//! returned as [`PushOutcome::Failed`] and never undo the local write; the
//! next local save retries. Nothing runs on a timer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingIndex;
use crate::models::{ChangeFeed, ChangeRecord, Document, FileInfo, SyncState};
use crate::store::Store;

/// Failure reported by a [`RemoteProvider`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("remote object not found: {0}")]
    NotFound(String),
    #[error("remote error: {0}")]
    Other(String),
}

/// Failure of a whole sync operation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// The remote authoritative document store.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    /// Name used as the key of the stored change-feed cursor.
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<(), RemoteError>;

    /// Changes since `cursor` (`None` = from the beginning).
    async fn fetch_changes(&self, cursor: Option<&str>) -> Result<ChangeFeed, RemoteError>;

    async fn read_object(&self, remote_ref: &str) -> Result<Document, RemoteError>;

    /// Create a remote copy and return its newly assigned ref.
    async fn create_object(&self, doc: &Document) -> Result<String, RemoteError>;

    async fn update_object(&self, remote_ref: &str, doc: &Document) -> Result<(), RemoteError>;

    async fn delete_object(&self, remote_ref: &str) -> Result<(), RemoteError>;

    async fn get_file_info(&self, remote_ref: &str) -> Result<FileInfo, RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Pulling,
    Applying,
}

/// Result of applying one change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Upserted under this local id.
    Applied(String),
    /// Local document with this id was deleted.
    Removed(String),
    /// Nothing to do (folder entry, or removal of an unknown ref).
    Skipped,
}

/// Summary of one pull cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub applied: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Cursor stored at the end of the cycle; `None` when it was not advanced.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PushOutcome {
    /// Sync is bypassed (demo/offline mode).
    Skipped,
    Created(String),
    Updated,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RemoteDeleteOutcome {
    /// Document was never linked to the remote store.
    NotSynced,
    Deleted,
    /// The remote entry is a folder; left untouched.
    Refused,
    Failed(String),
}

/// Resets the phase to `Idle` however the cycle ends.
struct PhaseGuard<'a> {
    phase: &'a Mutex<SyncPhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a Mutex<SyncPhase>) -> Self {
        let guard = Self { phase };
        guard.set(SyncPhase::Pulling);
        guard
    }

    fn set(&self, next: SyncPhase) {
        if let Ok(mut p) = self.phase.lock() {
            *p = next;
        }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.set(SyncPhase::Idle);
    }
}

/// Drives pulls and pushes against one remote provider.
pub struct SyncEngine {
    remote: Arc<dyn RemoteProvider>,
    index: EmbeddingIndex,
    phase: Mutex<SyncPhase>,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteProvider>, index: EmbeddingIndex) -> Self {
        Self {
            remote,
            index,
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    pub fn remote_name(&self) -> &str {
        self.remote.name()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
            .lock()
            .map(|p| *p)
            .unwrap_or(SyncPhase::Idle)
    }

    pub async fn initialize(&self) -> Result<(), SyncError> {
        self.remote.initialize().await?;
        Ok(())
    }

    /// Run one pull cycle.
    pub async fn pull<S: Store + ?Sized>(&self, store: &S) -> Result<SyncReport, SyncError> {
        let guard = PhaseGuard::enter(&self.phase);
        let name = self.remote.name();
        let cursor = store.get_sync_cursor(name).await?;
        debug!(remote = name, cursor = ?cursor, "fetching changes");
        let feed = self.remote.fetch_changes(cursor.as_deref()).await?;

        guard.set(SyncPhase::Applying);
        let mut report = SyncReport::default();
        for change in &feed.changes {
            match self.apply_change(store, change).await {
                Ok(ApplyOutcome::Applied(_)) => report.applied += 1,
                Ok(ApplyOutcome::Removed(_)) => report.removed += 1,
                Ok(ApplyOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(remote_ref = %change.remote_ref, error = %e, "failed to apply change");
                    report.failed += 1;
                }
            }
        }

        if report.failed == 0 {
            store.set_sync_cursor(name, &feed.new_cursor).await?;
            report.cursor = Some(feed.new_cursor);
        }
        info!(
            remote = name,
            applied = report.applied,
            removed = report.removed,
            skipped = report.skipped,
            failed = report.failed,
            "pull complete"
        );
        Ok(report)
    }

    /// Apply a single change record to the store.
    pub async fn apply_change<S: Store + ?Sized>(
        &self,
        store: &S,
        change: &ChangeRecord,
    ) -> Result<ApplyOutcome, SyncError> {
        let existing = store.find_by_remote_ref(&change.remote_ref).await?;

        if change.removed {
            return Ok(match existing {
                Some(doc) => {
                    store.delete(&doc.id).await?;
                    debug!(doc_id = %doc.id, remote_ref = %change.remote_ref, "removed locally");
                    ApplyOutcome::Removed(doc.id)
                }
                None => {
                    info!(remote_ref = %change.remote_ref, "removed remote entry has no local document");
                    ApplyOutcome::Skipped
                }
            });
        }

        let fetched: Result<Option<Document>, RemoteError> = async {
            let info = self.remote.get_file_info(&change.remote_ref).await?;
            if info.is_folder() {
                debug!(remote_ref = %change.remote_ref, name = %info.name, "skipping folder entry");
                return Ok(None);
            }
            self.remote.read_object(&change.remote_ref).await.map(Some)
        }
        .await;
        let mut doc = match fetched {
            Ok(Some(doc)) => doc,
            Ok(None) => return Ok(ApplyOutcome::Skipped),
            // Gone since the record was written; a later removal record covers it.
            Err(RemoteError::NotFound(_)) => {
                info!(remote_ref = %change.remote_ref, "remote object no longer exists");
                return Ok(ApplyOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };
        doc.id = match existing {
            Some(local) => local.id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        doc.sync_state = SyncState::Synced {
            remote_ref: change.remote_ref.clone(),
        };
        let stored = store.put(&doc).await?;
        self.index.regenerate(store, &stored).await;
        Ok(ApplyOutcome::Applied(stored.id))
    }

    /// Mirror a freshly saved document to the remote store.
    pub async fn push<S: Store + ?Sized>(&self, store: &S, doc: &Document) -> PushOutcome {
        match doc.remote_ref() {
            Some(remote_ref) => match self.remote.update_object(remote_ref, doc).await {
                Ok(()) => PushOutcome::Updated,
                Err(e) => {
                    warn!(doc_id = %doc.id, error = %e, "push update failed; document stays unsynced");
                    PushOutcome::Failed(e.to_string())
                }
            },
            None => {
                let remote_ref = match self.remote.create_object(doc).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(doc_id = %doc.id, error = %e, "push create failed; document stays local-only");
                        return PushOutcome::Failed(e.to_string());
                    }
                };
                let mut linked = doc.clone();
                linked.sync_state = SyncState::Synced {
                    remote_ref: remote_ref.clone(),
                };
                match store.put(&linked).await {
                    Ok(_) => PushOutcome::Created(remote_ref),
                    Err(e) => {
                        warn!(doc_id = %doc.id, remote_ref = %remote_ref, error = %e, "could not record remote link");
                        PushOutcome::Failed(format!(
                            "created remotely as {} but the link was not stored: {}",
                            remote_ref, e
                        ))
                    }
                }
            }
        }
    }

    /// Delete the remote copy of a document, refusing folder entries.
    pub async fn delete_remote(&self, doc: &Document) -> RemoteDeleteOutcome {
        let Some(remote_ref) = doc.remote_ref() else {
            return RemoteDeleteOutcome::NotSynced;
        };
        let result = async {
            let info = self.remote.get_file_info(remote_ref).await?;
            if info.is_folder() {
                return Ok(false);
            }
            self.remote.delete_object(remote_ref).await?;
            Ok::<bool, RemoteError>(true)
        }
        .await;
        match result {
            Ok(true) => RemoteDeleteOutcome::Deleted,
            Ok(false) => {
                warn!(remote_ref, "refusing to delete remote folder entry");
                RemoteDeleteOutcome::Refused
            }
            Err(e) => {
                warn!(remote_ref, error = %e, "remote delete failed");
                RemoteDeleteOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FOLDER_MIME_TYPE;
    use crate::store::memory::InMemoryStore;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeState {
        objects: BTreeMap<String, Document>,
        folders: Vec<String>,
        changes: Vec<ChangeRecord>,
        unreadable: Vec<String>,
        next_ref: usize,
        offline: bool,
        deleted: Vec<String>,
    }

    #[derive(Default)]
    struct FakeRemote {
        state: Mutex<FakeState>,
    }

    impl FakeRemote {
        fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }
    }

    #[async_trait]
    impl RemoteProvider for FakeRemote {
        fn name(&self) -> &str {
            "fake"
        }

        async fn initialize(&self) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn fetch_changes(&self, cursor: Option<&str>) -> Result<ChangeFeed, RemoteError> {
            self.with(|s| {
                if s.offline {
                    return Err(RemoteError::Network("unreachable".to_string()));
                }
                let from: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
                Ok(ChangeFeed {
                    changes: s.changes[from.min(s.changes.len())..].to_vec(),
                    new_cursor: s.changes.len().to_string(),
                })
            })
        }

        async fn read_object(&self, remote_ref: &str) -> Result<Document, RemoteError> {
            self.with(|s| {
                if s.unreadable.iter().any(|r| r == remote_ref) {
                    return Err(RemoteError::Quota("rate limited".to_string()));
                }
                s.objects
                    .get(remote_ref)
                    .cloned()
                    .ok_or_else(|| RemoteError::NotFound(remote_ref.to_string()))
            })
        }

        async fn create_object(&self, doc: &Document) -> Result<String, RemoteError> {
            self.with(|s| {
                if s.offline {
                    return Err(RemoteError::Network("unreachable".to_string()));
                }
                s.next_ref += 1;
                let r = format!("r{}", s.next_ref);
                s.objects.insert(r.clone(), doc.clone());
                Ok(r)
            })
        }

        async fn update_object(&self, remote_ref: &str, doc: &Document) -> Result<(), RemoteError> {
            self.with(|s| {
                if s.offline {
                    return Err(RemoteError::Network("unreachable".to_string()));
                }
                s.objects.insert(remote_ref.to_string(), doc.clone());
                Ok(())
            })
        }

        async fn delete_object(&self, remote_ref: &str) -> Result<(), RemoteError> {
            self.with(|s| {
                s.objects.remove(remote_ref);
                s.deleted.push(remote_ref.to_string());
                Ok(())
            })
        }

        async fn get_file_info(&self, remote_ref: &str) -> Result<FileInfo, RemoteError> {
            self.with(|s| {
                let mime_type = if s.folders.iter().any(|f| f == remote_ref) {
                    FOLDER_MIME_TYPE
                } else {
                    "application/json"
                };
                Ok(FileInfo {
                    mime_type: mime_type.to_string(),
                    name: remote_ref.to_string(),
                })
            })
        }
    }

    fn remote_doc(title: &str, ts: i64) -> Document {
        let mut d = Document::new(title, "note");
        d.last_modified = ts;
        d
    }

    fn upsert(remote_ref: &str) -> ChangeRecord {
        ChangeRecord {
            remote_ref: remote_ref.to_string(),
            removed: false,
            content: None,
        }
    }

    fn removal(remote_ref: &str) -> ChangeRecord {
        ChangeRecord {
            remote_ref: remote_ref.to_string(),
            removed: true,
            content: None,
        }
    }

    fn engine(remote: &Arc<FakeRemote>) -> SyncEngine {
        SyncEngine::new(remote.clone(), EmbeddingIndex::disabled())
    }

    #[tokio::test]
    async fn test_removed_without_local_mapping_is_noop() {
        let remote = Arc::new(FakeRemote::default());
        let store = InMemoryStore::new();
        let outcome = engine(&remote)
            .apply_change(&store, &removal("r1"))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let remote = Arc::new(FakeRemote::default());
        remote.with(|s| {
            s.objects.insert("r1".to_string(), remote_doc("Remote", 42));
        });
        let store = InMemoryStore::new();
        let engine = engine(&remote);

        engine.apply_change(&store, &upsert("r1")).await.unwrap();
        let first = store.get_all().await.unwrap();
        engine.apply_change(&store, &upsert("r1")).await.unwrap();
        let second = store.get_all().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].remote_ref(), Some("r1"));
        assert_eq!(second[0].last_modified, 42);
    }

    #[tokio::test]
    async fn test_pull_applies_removes_and_advances_cursor() {
        let remote = Arc::new(FakeRemote::default());
        remote.with(|s| {
            s.objects.insert("r1".to_string(), remote_doc("One", 1));
            s.objects.insert("r2".to_string(), remote_doc("Two", 2));
            s.folders.push("dir".to_string());
            s.changes = vec![upsert("r1"), upsert("r2"), upsert("dir")];
        });
        let store = InMemoryStore::new();
        let engine = engine(&remote);

        let report = engine.pull(&store).await.unwrap();
        assert_eq!((report.applied, report.skipped, report.failed), (2, 1, 0));
        assert_eq!(report.cursor.as_deref(), Some("3"));
        assert_eq!(engine.phase(), SyncPhase::Idle);

        remote.with(|s| s.changes.push(removal("r1")));
        let report = engine.pull(&store).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(store.find_by_remote_ref("r1").await.unwrap().is_none());
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_wins_over_local_edit() {
        let remote = Arc::new(FakeRemote::default());
        let mut server_copy = remote_doc("Server title", 5);
        server_copy.content = "server".to_string();
        remote.with(|s| {
            s.objects.insert("r1".to_string(), server_copy);
        });
        let store = InMemoryStore::new();
        let mut local = remote_doc("Local edit", 9);
        local.sync_state = SyncState::Synced {
            remote_ref: "r1".to_string(),
        };
        store.put(&local).await.unwrap();

        engine(&remote)
            .apply_change(&store, &upsert("r1"))
            .await
            .unwrap();
        let after = store.get(&local.id).await.unwrap().unwrap();
        assert_eq!(after.title, "Server title");
        assert_eq!(after.content, "server");
    }

    #[tokio::test]
    async fn test_upsert_of_vanished_object_is_skipped() {
        let remote = Arc::new(FakeRemote::default());
        remote.with(|s| s.changes = vec![upsert("gone"), removal("gone")]);
        let store = InMemoryStore::new();
        let report = engine(&remote).pull(&store).await.unwrap();
        assert_eq!((report.skipped, report.failed), (2, 0));
        assert_eq!(report.cursor.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_failed_record_keeps_cursor() {
        let remote = Arc::new(FakeRemote::default());
        remote.with(|s| {
            s.objects.insert("r1".to_string(), remote_doc("One", 1));
            s.unreadable.push("r2".to_string());
            s.changes = vec![upsert("r1"), upsert("r2")];
        });
        let store = InMemoryStore::new();
        let report = engine(&remote).pull(&store).await.unwrap();
        assert_eq!((report.applied, report.failed), (1, 1));
        assert_eq!(report.cursor, None);
        assert_eq!(store.get_sync_cursor("fake").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pull_surfaces_feed_errors_and_resets_phase() {
        let remote = Arc::new(FakeRemote::default());
        remote.with(|s| s.offline = true);
        let store = InMemoryStore::new();
        let engine = engine(&remote);
        let err = engine.pull(&store).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Network(_))));
        assert_eq!(engine.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_push_creates_then_updates() {
        let remote = Arc::new(FakeRemote::default());
        let store = InMemoryStore::new();
        let engine = engine(&remote);
        let doc = store.put(&remote_doc("Draft", 1)).await.unwrap();

        let outcome = engine.push(&store, &doc).await;
        assert_eq!(outcome, PushOutcome::Created("r1".to_string()));
        let linked = store.get(&doc.id).await.unwrap().unwrap();
        assert_eq!(linked.remote_ref(), Some("r1"));

        assert_eq!(engine.push(&store, &linked).await, PushOutcome::Updated);
        assert_eq!(remote.with(|s| s.objects.len()), 1);
    }

    #[tokio::test]
    async fn test_push_failure_leaves_local_document() {
        let remote = Arc::new(FakeRemote::default());
        remote.with(|s| s.offline = true);
        let store = InMemoryStore::new();
        let doc = store.put(&remote_doc("Offline draft", 1)).await.unwrap();

        let outcome = engine(&remote).push(&store, &doc).await;
        assert!(matches!(outcome, PushOutcome::Failed(_)));
        let local = store.get(&doc.id).await.unwrap().unwrap();
        assert_eq!(local.sync_state, SyncState::LocalOnly);
    }

    #[tokio::test]
    async fn test_delete_remote_refuses_folders() {
        let remote = Arc::new(FakeRemote::default());
        remote.with(|s| s.folders.push("dir".to_string()));
        let engine = engine(&remote);

        let mut doc = remote_doc("x", 1);
        assert_eq!(engine.delete_remote(&doc).await, RemoteDeleteOutcome::NotSynced);

        doc.sync_state = SyncState::Synced {
            remote_ref: "dir".to_string(),
        };
        assert_eq!(engine.delete_remote(&doc).await, RemoteDeleteOutcome::Refused);

        doc.sync_state = SyncState::Synced {
            remote_ref: "r9".to_string(),
        };
        assert_eq!(engine.delete_remote(&doc).await, RemoteDeleteOutcome::Deleted);
        assert_eq!(remote.with(|s| s.deleted.clone()), vec!["r9".to_string()]);
    }
}
