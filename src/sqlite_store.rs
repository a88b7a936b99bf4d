//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the tables created by
//! [`migrate`](crate::migrate). Tags and metadata are stored as JSON text
//! columns; the sync state is flattened into a nullable `remote_ref`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use mnemo_core::embedding::{blob_to_vec, vec_to_blob};
use mnemo_core::models::{
    Document, EmbeddingRecord, MirroredMessage, SyncState, TagConfig, TypeSchema,
};
use mnemo_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const DOCUMENT_COLUMNS: &str =
    "id, title, doc_type, content, tags_json, metadata_json, last_modified, pinned, remote_ref";

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let id: String = row.get("id");
    let tags_json: String = row.get("tags_json");
    let metadata_json: String = row.get("metadata_json");
    let remote_ref: Option<String> = row.get("remote_ref");
    let pinned: i64 = row.get("pinned");

    Ok(Document {
        tags: serde_json::from_str(&tags_json)
            .with_context(|| format!("corrupt tags for document {}", id))?,
        metadata: serde_json::from_str(&metadata_json)
            .with_context(|| format!("corrupt metadata for document {}", id))?,
        title: row.get("title"),
        doc_type: row.get("doc_type"),
        content: row.get("content"),
        last_modified: row.get("last_modified"),
        pinned: pinned != 0,
        sync_state: match remote_ref {
            Some(remote_ref) => SyncState::Synced { remote_ref },
            None => SyncState::LocalOnly,
        },
        id,
    })
}

fn rows_to_documents(rows: &[SqliteRow]) -> Result<Vec<Document>> {
    rows.iter().map(row_to_document).collect()
}

fn row_to_embedding(row: &SqliteRow) -> EmbeddingRecord {
    let blob: Vec<u8> = row.get("vector");
    EmbeddingRecord {
        document_id: row.get("document_id"),
        vector: blob_to_vec(&blob),
        model: row.get("model"),
        content_hash: row.get("content_hash"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY id ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows_to_documents(&rows)
    }

    async fn put(&self, doc: &Document) -> Result<Document> {
        let mut tx = self.pool.begin().await?;

        let existing_ref: Option<Option<String>> =
            sqlx::query_scalar("SELECT remote_ref FROM documents WHERE id = ?")
                .bind(&doc.id)
                .fetch_optional(&mut *tx)
                .await?;

        let mut stored = doc.clone();
        if let (SyncState::LocalOnly, Some(Some(remote_ref))) = (&doc.sync_state, existing_ref) {
            stored.sync_state = SyncState::Synced { remote_ref };
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, doc_type, content, tags_json, metadata_json,
                                   last_modified, pinned, remote_ref)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                doc_type = excluded.doc_type,
                content = excluded.content,
                tags_json = excluded.tags_json,
                metadata_json = excluded.metadata_json,
                last_modified = excluded.last_modified,
                pinned = excluded.pinned,
                remote_ref = excluded.remote_ref
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.title)
        .bind(&stored.doc_type)
        .bind(&stored.content)
        .bind(serde_json::to_string(&stored.tags)?)
        .bind(serde_json::to_string(&stored.metadata)?)
        .bind(stored.last_modified)
        .bind(stored.pinned as i64)
        .bind(stored.remote_ref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_by_type(&self, doc_type: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE doc_type = ? ORDER BY last_modified DESC, id ASC",
            DOCUMENT_COLUMNS
        ))
        .bind(doc_type)
        .fetch_all(&self.pool)
        .await?;
        rows_to_documents(&rows)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY last_modified DESC, id ASC LIMIT ?",
            DOCUMENT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows_to_documents(&rows)
    }

    async fn find_by_remote_ref(&self, remote_ref: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE remote_ref = ? LIMIT 1",
            DOCUMENT_COLUMNS
        ))
        .bind(remote_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn upsert_embedding(
        &self,
        doc_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, model, dims, content_hash, vector, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                content_hash = excluded.content_hash,
                vector = excluded.vector,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(doc_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(content_hash)
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_embedding(&self, doc_id: &str) -> Result<Option<EmbeddingRecord>> {
        let row = sqlx::query(
            "SELECT document_id, model, content_hash, vector FROM embeddings WHERE document_id = ?",
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_embedding))
    }

    async fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query("SELECT document_id, model, content_hash, vector FROM embeddings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_embedding).collect())
    }

    async fn delete_embedding(&self, doc_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<()> {
        sqlx::query("DELETE FROM embeddings")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_type_schemas(&self) -> Result<Vec<TypeSchema>> {
        let rows = sqlx::query("SELECT name, color, properties_json FROM type_schemas ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let name: String = row.get("name");
                let properties_json: String = row.get("properties_json");
                Ok(TypeSchema {
                    properties: serde_json::from_str(&properties_json)
                        .with_context(|| format!("corrupt properties for type {}", name))?,
                    color: row.get("color"),
                    name,
                })
            })
            .collect()
    }

    async fn put_type_schema(&self, schema: &TypeSchema) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO type_schemas (name, color, properties_json) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                color = excluded.color,
                properties_json = excluded.properties_json
            "#,
        )
        .bind(&schema.name)
        .bind(&schema.color)
        .bind(serde_json::to_string(&schema.properties)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_type_schema(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM type_schemas WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_tag_configs(&self) -> Result<Vec<TagConfig>> {
        let rows = sqlx::query("SELECT name, color FROM tag_configs ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| TagConfig {
                name: row.get("name"),
                color: row.get("color"),
            })
            .collect())
    }

    async fn put_tag_config(&self, tag: &TagConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO tag_configs (name, color) VALUES (?, ?) ON CONFLICT(name) DO UPDATE SET color = excluded.color",
        )
        .bind(&tag.name)
        .bind(&tag.color)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_sync_cursor(&self, name: &str) -> Result<Option<String>> {
        let cursor: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM sync_cursors WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor)
    }

    async fn set_sync_cursor(&self, name: &str, cursor: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (name, cursor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(cursor)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_mirrored_messages(&self, messages: &[MirroredMessage]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM mirrored_messages")
            .execute(&mut *tx)
            .await?;
        for msg in messages {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO mirrored_messages (id, subject, sender, snippet, received_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&msg.id)
            .bind(&msg.subject)
            .bind(&msg.sender)
            .bind(&msg.snippet)
            .bind(msg.received_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_mirrored_messages(&self) -> Result<Vec<MirroredMessage>> {
        let rows = sqlx::query(
            "SELECT id, subject, sender, snippet, received_at FROM mirrored_messages ORDER BY received_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| MirroredMessage {
                id: row.get("id"),
                subject: row.get("subject"),
                sender: row.get("sender"),
                snippet: row.get("snippet"),
                received_at: row.get("received_at"),
            })
            .collect())
    }

    async fn clear_mirrored_messages(&self) -> Result<()> {
        sqlx::query("DELETE FROM mirrored_messages")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_migrations;
    use mnemo_core::models::{Property, PropertyValue};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn doc(id: &str, ts: i64) -> Document {
        let mut d = Document::new(format!("Doc {}", id), "note");
        d.id = id.to_string();
        d.last_modified = ts;
        d
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_every_field() {
        let store = store().await;
        let mut d = doc("a", 10);
        d.content = "{\"blocks\":[]}".to_string();
        d.tags.insert("work".to_string());
        d.pinned = true;
        d.metadata.push(Property {
            key: "company".to_string(),
            value: PropertyValue::Reference("b".to_string()),
        });
        d.sync_state = SyncState::Synced {
            remote_ref: "r1".to_string(),
        };
        store.put(&d).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(d));
    }

    #[tokio::test]
    async fn test_local_put_keeps_remote_ref() {
        let store = store().await;
        let mut d = doc("a", 10);
        d.sync_state = SyncState::Synced {
            remote_ref: "r1".to_string(),
        };
        store.put(&d).await.unwrap();

        let stored = store.put(&doc("a", 20)).await.unwrap();
        assert_eq!(stored.remote_ref(), Some("r1"));
        let found = store.find_by_remote_ref("r1").await.unwrap().unwrap();
        assert_eq!(found.last_modified, 20);
    }

    #[tokio::test]
    async fn test_explicit_remote_ref_overrides_stored_one() {
        let store = store().await;
        let mut d = doc("a", 10);
        d.sync_state = SyncState::Synced {
            remote_ref: "r1".to_string(),
        };
        store.put(&d).await.unwrap();

        d.sync_state = SyncState::Synced {
            remote_ref: "r2".to_string(),
        };
        let stored = store.put(&d).await.unwrap();
        assert_eq!(stored.remote_ref(), Some("r2"));
        let found = store.find_by_remote_ref("r2").await.unwrap().unwrap();
        assert_eq!(found.id, "a");
        assert!(store.find_by_remote_ref("r1").await.unwrap().is_none());
        assert_eq!(store.get("a").await.unwrap().unwrap().remote_ref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_delete_removes_embedding_and_is_idempotent() {
        let store = store().await;
        store.put(&doc("a", 10)).await.unwrap();
        store
            .upsert_embedding("a", &[0.5, 0.5], "hash-64", "h")
            .await
            .unwrap();
        assert_eq!(store.all_embeddings().await.unwrap().len(), 1);

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get_embedding("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_ordering() {
        let store = store().await;
        store.put(&doc("a", 10)).await.unwrap();
        store.put(&doc("b", 30)).await.unwrap();
        store.put(&doc("c", 30)).await.unwrap();
        let ids: Vec<String> = store
            .list_recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_embedding_overwrite() {
        let store = store().await;
        store.put(&doc("a", 1)).await.unwrap();
        store.upsert_embedding("a", &[1.0], "m1", "h1").await.unwrap();
        store.upsert_embedding("a", &[0.0, 2.0], "m2", "h2").await.unwrap();
        let rec = store.get_embedding("a").await.unwrap().unwrap();
        assert_eq!(rec.vector, vec![0.0, 2.0]);
        assert_eq!(rec.model, "m2");
    }

    #[tokio::test]
    async fn test_schemas_tags_and_cursors() {
        let store = store().await;
        for schema in mnemo_core::models::default_type_schemas() {
            store.put_type_schema(&schema).await.unwrap();
        }
        assert_eq!(store.list_type_schemas().await.unwrap().len(), 3);
        store.delete_type_schema("meeting").await.unwrap();
        assert_eq!(store.list_type_schemas().await.unwrap().len(), 2);

        store
            .put_tag_config(&TagConfig {
                name: "work".to_string(),
                color: "#ff0000".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(store.list_tag_configs().await.unwrap()[0].color, "#ff0000");

        store.set_sync_cursor("directory", "4").await.unwrap();
        store.set_sync_cursor("directory", "9").await.unwrap();
        assert_eq!(
            store.get_sync_cursor("directory").await.unwrap().as_deref(),
            Some("9")
        );
    }
}
