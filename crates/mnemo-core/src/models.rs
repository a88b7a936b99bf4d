//! Core data models shared by every mnemo component.
//!
//! These types represent the documents, schemas, embeddings, and sync
//! bookkeeping that flow between the object store, the embedding index,
//! the search engine, the backlink extractor, and the sync engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Link between a local document and its counterpart in the remote store.
///
/// A document starts out `LocalOnly`; the first successful push or pull
/// establishes `Synced`, after which the reference never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    LocalOnly,
    Synced { remote_ref: String },
}

impl SyncState {
    pub fn remote_ref(&self) -> Option<&str> {
        match self {
            SyncState::LocalOnly => None,
            SyncState::Synced { remote_ref } => Some(remote_ref),
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced { .. })
    }
}

/// Typed value of a metadata property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    /// ISO 8601 date (`YYYY-MM-DD`).
    Date(String),
    /// Id of another document.
    Reference(String),
}

/// A single ordered key/value metadata entry on a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
}

/// A user-authored knowledge unit (note, contact, meeting, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable id, assigned at creation and never changed.
    pub id: String,
    pub title: String,
    /// Name of the [`TypeSchema`] this document follows.
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Serialized [`Body`](crate::content::Body), opaque to the store.
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Vec<Property>,
    /// Unix timestamp in milliseconds of the last write.
    pub last_modified: i64,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Document {
    /// Create a new local-only document with a fresh UUID.
    pub fn new(title: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            doc_type: doc_type.into(),
            content: String::new(),
            tags: BTreeSet::new(),
            metadata: Vec::new(),
            last_modified: now_millis(),
            pinned: false,
            sync_state: SyncState::LocalOnly,
        }
    }

    pub fn remote_ref(&self) -> Option<&str> {
        self.sync_state.remote_ref()
    }

    /// Ids referenced from `Reference` metadata values, in property order.
    pub fn metadata_references(&self) -> impl Iterator<Item = &str> {
        self.metadata.iter().filter_map(|p| match &p.value {
            PropertyValue::Reference(id) => Some(id.as_str()),
            _ => None,
        })
    }
}

/// Kind of value a schema property expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    Number,
    Boolean,
    Date,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub key: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
}

/// Expected metadata shape for a document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

/// Schemas seeded into an empty store.
pub fn default_type_schemas() -> Vec<TypeSchema> {
    let def = |key: &str, kind| PropertyDefinition {
        key: key.to_string(),
        kind,
        required: false,
    };
    vec![
        TypeSchema {
            name: "note".to_string(),
            color: "#8b5cf6".to_string(),
            properties: Vec::new(),
        },
        TypeSchema {
            name: "contact".to_string(),
            color: "#10b981".to_string(),
            properties: vec![
                def("email", PropertyKind::Text),
                def("phone", PropertyKind::Text),
                def("company", PropertyKind::Reference),
            ],
        },
        TypeSchema {
            name: "meeting".to_string(),
            color: "#f59e0b".to_string(),
            properties: vec![
                def("date", PropertyKind::Date),
                def("attendee", PropertyKind::Reference),
            ],
        },
    ]
}

/// Display configuration for a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagConfig {
    pub name: String,
    pub color: String,
}

/// Stored vector for one document. At most one per document id.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub document_id: String,
    pub vector: Vec<f32>,
    pub model: String,
    /// SHA-256 of the text the vector was computed from.
    pub content_hash: String,
}

/// A delta from the remote provider's change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub remote_ref: String,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub content: Option<Document>,
}

/// One page of the remote change feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeFeed {
    pub changes: Vec<ChangeRecord>,
    pub new_cursor: String,
}

/// Minimal description of a remote entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub mime_type: String,
    pub name: String,
}

/// Mime type the remote side uses for container entries.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.mnemo.folder";

impl FileInfo {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE || self.mime_type.ends_with(".folder")
    }
}

/// Cached copy of an externally mirrored message. Not authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirroredMessage {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub snippet: String,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub received_at: i64,
}

/// Current time as unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
