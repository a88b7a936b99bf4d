//! Storage abstraction for mnemo.
//!
//! The [`Store`] trait is the single shared mutable resource of the system:
//! documents, their embeddings, type schemas, tag configs, sync cursors, and
//! the mirrored message cache. Every other component reads through it and
//! keeps no document state beyond one operation.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! A `put` that has returned is visible to every subsequent `get`/`get_all`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, EmbeddingRecord, MirroredMessage, TagConfig, TypeSchema};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](Store::get) | Fetch one document; `None` when missing |
/// | [`put`](Store::put) | Upsert by id, preserving an established remote ref |
/// | [`delete`](Store::delete) | Remove a document and its embedding (idempotent) |
/// | [`find_by_remote_ref`](Store::find_by_remote_ref) | Map a remote ref back to a local document |
/// | [`upsert_embedding`](Store::upsert_embedding) | Overwrite a document's vector |
#[async_trait]
pub trait Store: Send + Sync {
    /// Retrieve a document by id. Never errors on a missing id.
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Every stored document.
    async fn get_all(&self) -> Result<Vec<Document>>;

    /// Insert or overwrite a document by id.
    ///
    /// When `doc.sync_state` is `LocalOnly` and the existing record is
    /// synced, the existing remote ref is kept. Returns the stored record.
    async fn put(&self, doc: &Document) -> Result<Document>;

    /// Remove a document and its embedding. Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Documents of the given type, most recently modified first.
    async fn list_by_type(&self, doc_type: &str) -> Result<Vec<Document>>;

    /// The `limit` most recently modified documents.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Document>>;

    /// The local document linked to `remote_ref`, if any.
    async fn find_by_remote_ref(&self, remote_ref: &str) -> Result<Option<Document>>;

    /// Store or overwrite the embedding for a document.
    async fn upsert_embedding(
        &self,
        doc_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()>;

    async fn get_embedding(&self, doc_id: &str) -> Result<Option<EmbeddingRecord>>;

    async fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>>;

    async fn delete_embedding(&self, doc_id: &str) -> Result<()>;

    /// Remove every stored embedding.
    async fn clear_embeddings(&self) -> Result<()>;

    async fn list_type_schemas(&self) -> Result<Vec<TypeSchema>>;

    async fn put_type_schema(&self, schema: &TypeSchema) -> Result<()>;

    async fn delete_type_schema(&self, name: &str) -> Result<()>;

    async fn list_tag_configs(&self) -> Result<Vec<TagConfig>>;

    async fn put_tag_config(&self, tag: &TagConfig) -> Result<()>;

    /// Last change-feed cursor recorded for the named remote.
    async fn get_sync_cursor(&self, name: &str) -> Result<Option<String>>;

    async fn set_sync_cursor(&self, name: &str, cursor: &str) -> Result<()>;

    /// Replace the whole mirrored message cache.
    async fn replace_mirrored_messages(&self, messages: &[MirroredMessage]) -> Result<()>;

    async fn list_mirrored_messages(&self) -> Result<Vec<MirroredMessage>>;

    async fn clear_mirrored_messages(&self) -> Result<()>;
}

/// Merge the incoming sync state with the stored one per the `put` contract.
pub fn preserve_sync_state(incoming: &Document, existing: Option<&Document>) -> Document {
    let mut stored = incoming.clone();
    if !stored.sync_state.is_synced() {
        if let Some(prev) = existing {
            if prev.sync_state.is_synced() {
                stored.sync_state = prev.sync_state.clone();
            }
        }
    }
    stored
}

/// Order documents most recently modified first, ties by id.
pub fn sort_recent_first(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.id.cmp(&b.id))
    });
}
