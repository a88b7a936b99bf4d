//! In-memory [`Store`] implementation.
//!
//! Used by tests and as the demo/offline fallback when the durable store
//! cannot be opened: writes are accepted and readable for the life of the
//! process, but nothing survives a restart.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Iteration order is by key,
//! which keeps `get_all` deterministic.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Document, EmbeddingRecord, MirroredMessage, TagConfig, TypeSchema};

use super::{preserve_sync_state, sort_recent_first, Store};

#[derive(Default)]
struct Collections {
    documents: BTreeMap<String, Document>,
    embeddings: BTreeMap<String, EmbeddingRecord>,
    type_schemas: BTreeMap<String, TypeSchema>,
    tag_configs: BTreeMap<String, TagConfig>,
    sync_cursors: BTreeMap<String, String>,
    mirrored_messages: Vec<MirroredMessage>,
}

/// In-memory store for tests and demo mode.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Document>> {
        Ok(self.read()?.documents.values().cloned().collect())
    }

    async fn put(&self, doc: &Document) -> Result<Document> {
        let mut inner = self.write()?;
        let stored = preserve_sync_state(doc, inner.documents.get(&doc.id));
        inner.documents.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.write()?;
        inner.documents.remove(id);
        inner.embeddings.remove(id);
        Ok(())
    }

    async fn list_by_type(&self, doc_type: &str) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .read()?
            .documents
            .values()
            .filter(|d| d.doc_type == doc_type)
            .cloned()
            .collect();
        sort_recent_first(&mut docs);
        Ok(docs)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Document>> {
        let mut docs = self.get_all().await?;
        sort_recent_first(&mut docs);
        docs.truncate(limit);
        Ok(docs)
    }

    async fn find_by_remote_ref(&self, remote_ref: &str) -> Result<Option<Document>> {
        Ok(self
            .read()?
            .documents
            .values()
            .find(|d| d.remote_ref() == Some(remote_ref))
            .cloned())
    }

    async fn upsert_embedding(
        &self,
        doc_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()> {
        self.write()?.embeddings.insert(
            doc_id.to_string(),
            EmbeddingRecord {
                document_id: doc_id.to_string(),
                vector: vector.to_vec(),
                model: model.to_string(),
                content_hash: content_hash.to_string(),
            },
        );
        Ok(())
    }

    async fn get_embedding(&self, doc_id: &str) -> Result<Option<EmbeddingRecord>> {
        Ok(self.read()?.embeddings.get(doc_id).cloned())
    }

    async fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        Ok(self.read()?.embeddings.values().cloned().collect())
    }

    async fn delete_embedding(&self, doc_id: &str) -> Result<()> {
        self.write()?.embeddings.remove(doc_id);
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<()> {
        self.write()?.embeddings.clear();
        Ok(())
    }

    async fn list_type_schemas(&self) -> Result<Vec<TypeSchema>> {
        Ok(self.read()?.type_schemas.values().cloned().collect())
    }

    async fn put_type_schema(&self, schema: &TypeSchema) -> Result<()> {
        self.write()?
            .type_schemas
            .insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    async fn delete_type_schema(&self, name: &str) -> Result<()> {
        self.write()?.type_schemas.remove(name);
        Ok(())
    }

    async fn list_tag_configs(&self) -> Result<Vec<TagConfig>> {
        Ok(self.read()?.tag_configs.values().cloned().collect())
    }

    async fn put_tag_config(&self, tag: &TagConfig) -> Result<()> {
        self.write()?
            .tag_configs
            .insert(tag.name.clone(), tag.clone());
        Ok(())
    }

    async fn get_sync_cursor(&self, name: &str) -> Result<Option<String>> {
        Ok(self.read()?.sync_cursors.get(name).cloned())
    }

    async fn set_sync_cursor(&self, name: &str, cursor: &str) -> Result<()> {
        self.write()?
            .sync_cursors
            .insert(name.to_string(), cursor.to_string());
        Ok(())
    }

    async fn replace_mirrored_messages(&self, messages: &[MirroredMessage]) -> Result<()> {
        self.write()?.mirrored_messages = messages.to_vec();
        Ok(())
    }

    async fn list_mirrored_messages(&self) -> Result<Vec<MirroredMessage>> {
        Ok(self.read()?.mirrored_messages.clone())
    }

    async fn clear_mirrored_messages(&self) -> Result<()> {
        self.write()?.mirrored_messages.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncState;

    fn doc(id: &str, ts: i64) -> Document {
        let mut d = Document::new(format!("Doc {}", id), "note");
        d.id = id.to_string();
        d.last_modified = ts;
        d
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let store = InMemoryStore::new();
        let d = doc("1", 10);
        let stored = store.put(&d).await.unwrap();
        assert_eq!(stored, d);
        assert_eq!(store.get("1").await.unwrap(), Some(d));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_preserves_remote_ref() {
        let store = InMemoryStore::new();
        let mut d = doc("1", 10);
        d.sync_state = SyncState::Synced {
            remote_ref: "r1".to_string(),
        };
        store.put(&d).await.unwrap();

        let mut edited = doc("1", 20);
        edited.title = "Edited".to_string();
        let stored = store.put(&edited).await.unwrap();
        assert_eq!(stored.remote_ref(), Some("r1"));
        assert_eq!(stored.title, "Edited");
        assert_eq!(
            store.find_by_remote_ref("r1").await.unwrap().map(|d| d.id),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn test_put_with_new_remote_ref_replaces_old() {
        let store = InMemoryStore::new();
        let mut d = doc("1", 10);
        d.sync_state = SyncState::Synced {
            remote_ref: "r1".to_string(),
        };
        store.put(&d).await.unwrap();

        d.sync_state = SyncState::Synced {
            remote_ref: "r2".to_string(),
        };
        let stored = store.put(&d).await.unwrap();
        assert_eq!(stored.remote_ref(), Some("r2"));
        assert_eq!(
            store.find_by_remote_ref("r2").await.unwrap().map(|d| d.id),
            Some("1".to_string())
        );
        assert!(store.find_by_remote_ref("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_drops_embedding() {
        let store = InMemoryStore::new();
        store.put(&doc("1", 10)).await.unwrap();
        store.upsert_embedding("1", &[1.0], "m", "h").await.unwrap();
        store.delete("1").await.unwrap();
        store.delete("1").await.unwrap();
        assert!(store.get("1").await.unwrap().is_none());
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(store.get_embedding("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_and_by_type() {
        let store = InMemoryStore::new();
        store.put(&doc("a", 10)).await.unwrap();
        store.put(&doc("b", 30)).await.unwrap();
        let mut c = doc("c", 20);
        c.doc_type = "contact".to_string();
        store.put(&c).await.unwrap();

        let recent: Vec<String> = store
            .list_recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(recent, vec!["b", "c"]);

        let notes: Vec<String> = store
            .list_by_type("note")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(notes, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_cursor_and_mirror() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_sync_cursor("drive").await.unwrap(), None);
        store.set_sync_cursor("drive", "7").await.unwrap();
        assert_eq!(
            store.get_sync_cursor("drive").await.unwrap().as_deref(),
            Some("7")
        );

        let msg = MirroredMessage {
            id: "m1".to_string(),
            subject: "Invoice".to_string(),
            sender: "billing@example.com".to_string(),
            snippet: String::new(),
            received_at: 0,
        };
        store.replace_mirrored_messages(&[msg]).await.unwrap();
        assert_eq!(store.list_mirrored_messages().await.unwrap().len(), 1);
        store.clear_mirrored_messages().await.unwrap();
        assert!(store.list_mirrored_messages().await.unwrap().is_empty());
    }
}
