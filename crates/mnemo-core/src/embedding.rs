//! Embedding provider trait, vector utilities, and the embedding index.
//!
//! Holds the [`EmbeddingProvider`] seam, the byte layout vectors are
//! stored in, cosine scoring, and [`EmbeddingIndex`]. The index keeps
//! exactly one vector per document and never lets an embedding failure
//! escape into the caller.
//!
//! Concrete provider implementations (hash, OpenAI, Ollama) live in the
//! `mnemo` app crate.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::content::plain_text_of;
use crate::models::Document;
use crate::store::Store;

/// A text-to-vector backend.
///
/// `embed` may return `Ok(None)` when the provider has nothing to say about
/// the text (e.g. empty input); errors are reserved for provider failures.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier stored next to each vector, so a model change marks
    /// every stored embedding stale.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;
}

/// Pack a vector into the little-endian byte layout of the `embeddings` table.
///
/// ```rust
/// use mnemo_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let packed = vec_to_blob(&[0.5f32, -4.0]);
/// assert_eq!(packed.len(), 8);
/// assert_eq!(blob_to_vec(&packed), vec![0.5, -4.0]);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]. Trailing bytes that do not fill an `f32` are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|chunk| chunk.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

/// Cosine of the angle between `a` and `b`, clamped to `[-1, 1]`.
///
/// Mismatched lengths, empty input, and zero vectors all score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, sq_a, sq_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });
    let magnitude = (sq_a * sq_b).sqrt();
    if magnitude < f32::EPSILON {
        0.0
    } else {
        (dot / magnitude).clamp(-1.0, 1.0)
    }
}

/// The text a document's embedding is computed from: title, plain body, tags.
pub fn embedding_text(doc: &Document) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(3);
    parts.push(doc.title.clone());
    let body = plain_text_of(&doc.content);
    if !body.is_empty() {
        parts.push(body);
    }
    if !doc.tags.is_empty() {
        parts.push(doc.tags.iter().cloned().collect::<Vec<_>>().join(" "));
    }
    parts.join("\n")
}

/// SHA-256 hex digest used to detect stale embeddings.
pub fn hash_text(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Best-effort embedding maintenance on top of an optional provider.
///
/// Every method here absorbs provider and storage failures: a document
/// without an embedding is simply excluded from the vector pass of search.
#[derive(Clone, Default)]
pub struct EmbeddingIndex {
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl EmbeddingIndex {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { provider }
    }

    /// An index with no provider; `embed` always yields `None`.
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.model_name())
    }

    /// Embed text, mapping every failure to `None`.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.provider.as_ref()?;
        match provider.embed(text).await {
            Ok(Some(v)) if v.len() != provider.dims() => {
                warn!(
                    model = provider.model_name(),
                    expected = provider.dims(),
                    got = v.len(),
                    "embedding has the wrong dimensionality; ignoring it"
                );
                None
            }
            Ok(Some(v)) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                warn!(model = provider.model_name(), error = %e, "embedding failed");
                None
            }
        }
    }

    /// Recompute and overwrite the embedding for `doc`.
    ///
    /// Returns `true` when a fresh vector was stored.
    pub async fn regenerate<S: Store + ?Sized>(&self, store: &S, doc: &Document) -> bool {
        let Some(provider) = self.provider.as_ref() else {
            return false;
        };
        let text = embedding_text(doc);
        let Some(vector) = self.embed(&text).await else {
            return false;
        };
        let hash = hash_text(&text);
        match store
            .upsert_embedding(&doc.id, &vector, provider.model_name(), &hash)
            .await
        {
            Ok(()) => {
                debug!(doc_id = %doc.id, dims = vector.len(), "embedding stored");
                true
            }
            Err(e) => {
                warn!(doc_id = %doc.id, error = %e, "failed to store embedding");
                false
            }
        }
    }

    /// Whether the stored embedding for `doc` is missing or out of date.
    pub async fn is_stale<S: Store + ?Sized>(&self, store: &S, doc: &Document) -> Result<bool> {
        let Some(provider) = self.provider.as_ref() else {
            return Ok(false);
        };
        let existing = store.get_embedding(&doc.id).await?;
        Ok(match existing {
            Some(rec) => {
                rec.model != provider.model_name()
                    || rec.content_hash != hash_text(&embedding_text(doc))
            }
            None => true,
        })
    }
}
