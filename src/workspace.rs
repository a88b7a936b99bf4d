//! The application facade.
//!
//! A [`Workspace`] owns one store, one embedding index, and (optionally) one
//! sync engine, wired together from [`Config`]. Every caller (CLI commands,
//! integration tests) goes through it, so the side effects of a save are
//! always the same: stamp, write, embed, push.
//!
//! # Demo mode
//!
//! When the SQLite store cannot be opened, or `sync.demo = true`, the
//! workspace falls back to an [`InMemoryStore`] and bypasses sync entirely.
//! Writes still succeed and are readable until the process exits.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use mnemo_core::backlinks::{find_backlinks, outgoing_references, BacklinkGroup, BacklinkParams};
use mnemo_core::embedding::EmbeddingIndex;
use mnemo_core::models::{
    default_type_schemas, now_millis, Document, MirroredMessage, TagConfig, TypeSchema,
};
use mnemo_core::search::{normalize_text, search, wants_semantic, SearchParams, SearchRequest, SearchResponse};
use mnemo_core::store::memory::InMemoryStore;
use mnemo_core::store::Store;
use mnemo_core::sync::{PushOutcome, RemoteDeleteOutcome, SyncEngine, SyncPhase, SyncReport};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::migrate;
use crate::remote_fs::DirectoryRemote;
use crate::sqlite_store::SqliteStore;

enum Backend {
    Sqlite(SqliteStore),
    Memory(InMemoryStore),
}

/// Everything a save did, beyond the local write.
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    /// The document as stored (with `last_modified` and any new remote link).
    pub document: Document,
    /// Whether a fresh embedding was stored.
    pub embedded: bool,
    pub push: PushOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    /// Whether a local document existed.
    pub existed: bool,
    pub remote: RemoteDeleteOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbedReport {
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
}

pub struct Workspace {
    backend: Backend,
    index: EmbeddingIndex,
    sync: Option<SyncEngine>,
    search_params: SearchParams,
    backlink_params: BacklinkParams,
}

async fn open_sqlite(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::apply_migrations(&pool).await?;
    Ok(SqliteStore::new(pool))
}

impl Workspace {
    /// Open the workspace described by `config`.
    ///
    /// Fails only on configuration errors (e.g. a provider that cannot be
    /// constructed); an unusable database degrades to demo mode.
    pub async fn open(config: &Config) -> Result<Self> {
        let index = EmbeddingIndex::new(create_provider(&config.embedding)?);

        let backend = if config.sync.demo {
            info!("demo mode requested; using in-memory store");
            Backend::Memory(InMemoryStore::new())
        } else {
            match open_sqlite(config).await {
                Ok(store) => Backend::Sqlite(store),
                Err(e) => {
                    warn!(error = %e, "could not open local store; falling back to demo mode");
                    Backend::Memory(InMemoryStore::new())
                }
            }
        };
        let demo = matches!(backend, Backend::Memory(_));

        let sync = match (demo, config.sync.provider.as_str()) {
            (false, "directory") => {
                let root = config
                    .sync
                    .root
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("sync.root must be set for the directory provider"))?;
                let remote = DirectoryRemote::new(config.sync.cursor_name(), root);
                let engine = SyncEngine::new(Arc::new(remote), index.clone());
                if let Err(e) = engine.initialize().await {
                    warn!(error = %e, "remote unavailable; pushes will fail until it returns");
                }
                Some(engine)
            }
            _ => None,
        };

        let ws = Self {
            backend,
            index,
            sync,
            search_params: config.retrieval.search_params(),
            backlink_params: config.backlinks.params(),
        };
        ws.seed_type_schemas().await?;
        Ok(ws)
    }

    /// A demo-mode workspace with default parameters and the given index.
    pub fn in_memory(index: EmbeddingIndex) -> Self {
        Self {
            backend: Backend::Memory(InMemoryStore::new()),
            index,
            sync: None,
            search_params: SearchParams::default(),
            backlink_params: BacklinkParams::default(),
        }
    }

    async fn seed_type_schemas(&self) -> Result<()> {
        let store = self.store();
        if store.list_type_schemas().await?.is_empty() {
            for schema in default_type_schemas() {
                store.put_type_schema(&schema).await?;
            }
            debug!("seeded default type schemas");
        }
        Ok(())
    }

    pub fn store(&self) -> &dyn Store {
        match &self.backend {
            Backend::Sqlite(s) => s,
            Backend::Memory(s) => s,
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync.is_some()
    }

    pub fn sync_phase(&self) -> SyncPhase {
        self.sync
            .as_ref()
            .map(|s| s.phase())
            .unwrap_or(SyncPhase::Idle)
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.index.model_name()
    }

    /// Write a document and run its side effects.
    pub async fn save(&self, mut doc: Document) -> Result<SaveReport> {
        let store = self.store();
        doc.last_modified = now_millis();
        let mut stored = store.put(&doc).await?;
        let embedded = self.index.regenerate(store, &stored).await;

        let push = match &self.sync {
            Some(engine) => engine.push(store, &stored).await,
            None => PushOutcome::Skipped,
        };
        if let PushOutcome::Created(remote_ref) = &push {
            stored.sync_state = mnemo_core::models::SyncState::Synced {
                remote_ref: remote_ref.clone(),
            };
        }
        debug!(doc_id = %stored.id, embedded, push = ?push, "saved");

        Ok(SaveReport {
            document: stored,
            embedded,
            push,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.store().get(id).await
    }

    pub async fn list(&self, doc_type: Option<&str>, limit: usize) -> Result<Vec<Document>> {
        let mut docs = match doc_type {
            Some(t) => self.store().list_by_type(t).await?,
            None => self.store().list_recent(limit).await?,
        };
        docs.truncate(limit);
        Ok(docs)
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Document>> {
        self.store().list_recent(limit).await
    }

    /// Delete locally, then remove the remote copy when the document is synced.
    pub async fn delete(&self, id: &str) -> Result<DeleteReport> {
        let store = self.store();
        let Some(doc) = store.get(id).await? else {
            return Ok(DeleteReport {
                existed: false,
                remote: RemoteDeleteOutcome::NotSynced,
            });
        };
        store.delete(id).await?;
        let remote = match &self.sync {
            Some(engine) => engine.delete_remote(&doc).await,
            None => RemoteDeleteOutcome::NotSynced,
        };
        Ok(DeleteReport {
            existed: true,
            remote,
        })
    }

    /// Hybrid search. The query is embedded only when it is long enough.
    pub async fn search(&self, query: &str, explain: bool) -> Result<SearchResponse> {
        let normalized = normalize_text(query);
        let query_vec = if self.index.is_enabled() && wants_semantic(&normalized, &self.search_params)
        {
            self.index.embed(query.trim()).await
        } else {
            None
        };
        let req = SearchRequest {
            query,
            query_vec: query_vec.as_deref(),
            params: self.search_params.clone(),
            explain,
        };
        search(self.store(), &req).await
    }

    pub async fn backlinks(&self, id: &str) -> Result<Vec<BacklinkGroup>> {
        find_backlinks(self.store(), id, &self.backlink_params).await
    }

    /// Documents `id` links to, resolved against the store. Dangling ids are dropped.
    pub async fn outgoing(&self, id: &str) -> Result<Vec<Document>> {
        let Some(doc) = self.get(id).await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for target in outgoing_references(&doc) {
            if let Some(d) = self.get(&target).await? {
                out.push(d);
            }
        }
        Ok(out)
    }

    /// Pull remote changes into the local store.
    pub async fn pull(&self) -> Result<SyncReport> {
        let Some(engine) = &self.sync else {
            if self.is_demo() {
                bail!("sync is bypassed in demo mode");
            }
            bail!("sync is not configured; set [sync] provider in config");
        };
        Ok(engine.pull(self.store()).await?)
    }

    /// Embed documents whose vector is missing or stale. `rebuild` clears first.
    pub async fn embed_documents(&self, rebuild: bool) -> Result<EmbedReport> {
        if !self.index.is_enabled() {
            bail!("Embedding provider is disabled. Set [embedding] provider in config.");
        }
        let store = self.store();
        if rebuild {
            store.clear_embeddings().await?;
        }
        let mut report = EmbedReport::default();
        for doc in store.get_all().await? {
            if !self.index.is_stale(store, &doc).await? {
                continue;
            }
            report.total += 1;
            if self.index.regenerate(store, &doc).await {
                report.embedded += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    pub async fn type_schemas(&self) -> Result<Vec<TypeSchema>> {
        self.store().list_type_schemas().await
    }

    pub async fn set_type_schema(&self, schema: &TypeSchema) -> Result<()> {
        self.store().put_type_schema(schema).await
    }

    pub async fn tag_configs(&self) -> Result<Vec<TagConfig>> {
        self.store().list_tag_configs().await
    }

    pub async fn set_tag_config(&self, tag: &TagConfig) -> Result<()> {
        self.store().put_tag_config(tag).await
    }

    pub async fn import_mirrored_messages(&self, messages: &[MirroredMessage]) -> Result<()> {
        self.store().replace_mirrored_messages(messages).await
    }

    pub async fn clear_mirrored_messages(&self) -> Result<()> {
        self.store().clear_mirrored_messages().await
    }

    /// Release the database pool.
    pub async fn close(self) {
        if let Backend::Sqlite(store) = &self.backend {
            store.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;

    fn hash_index() -> EmbeddingIndex {
        EmbeddingIndex::new(Some(Arc::new(HashProvider::new(64))))
    }

    #[tokio::test]
    async fn test_save_stamps_and_embeds() {
        let ws = Workspace::in_memory(hash_index());
        let mut doc = Document::new("Planning", "note");
        doc.last_modified = 0;
        let report = ws.save(doc).await.unwrap();
        assert!(report.document.last_modified > 0);
        assert!(report.embedded);
        assert_eq!(report.push, PushOutcome::Skipped);
        assert!(ws
            .store()
            .get_embedding(&report.document.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_pull_without_sync_is_an_error() {
        let ws = Workspace::in_memory(EmbeddingIndex::disabled());
        assert!(ws.pull().await.is_err());
    }

    #[tokio::test]
    async fn test_embed_documents_skips_fresh_vectors() {
        let ws = Workspace::in_memory(hash_index());
        ws.save(Document::new("One", "note")).await.unwrap();
        ws.save(Document::new("Two", "note")).await.unwrap();
        let pending = ws.embed_documents(false).await.unwrap();
        assert_eq!(pending.total, 0);
        let rebuilt = ws.embed_documents(true).await.unwrap();
        assert_eq!((rebuilt.total, rebuilt.embedded), (2, 2));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let ws = Workspace::in_memory(EmbeddingIndex::disabled());
        let report = ws.delete("nope").await.unwrap();
        assert!(!report.existed);
    }
}
