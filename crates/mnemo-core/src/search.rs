//! Hybrid keyword + semantic search.
//!
//! The core search algorithm operates entirely through the [`Store`] trait,
//! with no database or configuration dependencies. The calling application
//! is responsible for embedding the query and constructing [`SearchParams`].
//!
//! # Scoring Algorithm
//!
//! 1. Normalize the query: case-fold and strip diacritics.
//! 2. Keyword pass: every document whose normalized title, body, or tags
//!    contain the query seeds a score of `keyword_base_score`.
//! 3. Vector pass (queries of at least `min_semantic_query_chars` with a
//!    query vector): cosine similarity against every stored embedding; only
//!    similarities strictly above `relevance_threshold` count. They are added
//!    to a keyword-seeded score, or become the score on their own.
//! 4. Sort by score (desc), last_modified (desc), id (asc).
//! 5. Truncate to `final_limit`.
//! 6. Append substring matches from the mirrored message cache, unscored.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::content::plain_text_of;
use crate::embedding::cosine_similarity;
use crate::models::{Document, MirroredMessage};
use crate::store::Store;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Score given to every keyword match.
    pub keyword_base_score: f64,
    /// Similarities at or below this are discarded.
    pub relevance_threshold: f64,
    /// Queries shorter than this (in chars, after normalization) skip the vector pass.
    pub min_semantic_query_chars: usize,
    /// Maximum ranked results.
    pub final_limit: usize,
    /// Maximum mirrored-message hits appended after the ranked results.
    pub fallback_limit: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            keyword_base_score: 0.5,
            relevance_threshold: 0.55,
            min_semantic_query_chars: 3,
            final_limit: 20,
            fallback_limit: 10,
        }
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Pre-computed query embedding. `None` skips the vector pass.
    pub query_vec: Option<&'a [f32]>,
    pub params: SearchParams,
    /// If true, populate [`ScoreExplanation`] on each result.
    pub explain: bool,
}

/// A ranked document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub score: f64,
    pub last_modified: i64,
    /// Start of the document's plain text.
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Scoring breakdown for a search result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreExplanation {
    /// `keyword_base_score` if the document matched the keyword pass, else 0.
    pub keyword_score: f64,
    /// Cosine similarity if it cleared the threshold, else 0.
    pub semantic_score: f64,
    pub keyword_matches: usize,
    pub vector_matches: usize,
}

/// An unscored match from the mirrored message cache.
#[derive(Debug, Clone, Serialize)]
pub struct MirroredHit {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub mirrored: Vec<MirroredHit>,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.id.as_str()).collect()
    }
}

const SNIPPET_CHARS: usize = 160;

/// Case-fold and strip diacritics.
///
/// ```rust
/// use mnemo_core::search::normalize_text;
///
/// assert_eq!(normalize_text("Crème BRÛLÉE"), "creme brulee");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether the vector pass runs for this (already normalized) query.
pub fn wants_semantic(normalized_query: &str, params: &SearchParams) -> bool {
    normalized_query.chars().count() >= params.min_semantic_query_chars
}

fn keyword_match(doc: &Document, q: &str) -> bool {
    normalize_text(&doc.title).contains(q)
        || normalize_text(&plain_text_of(&doc.content)).contains(q)
        || doc.tags.iter().any(|t| normalize_text(t).contains(q))
}

fn mirrored_match(msg: &MirroredMessage, q: &str) -> bool {
    normalize_text(&msg.subject).contains(q)
        || normalize_text(&msg.sender).contains(q)
        || normalize_text(&msg.snippet).contains(q)
}

fn snippet_of(doc: &Document) -> String {
    plain_text_of(&doc.content)
        .replace('\n', " ")
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}

/// Run a hybrid search against a [`Store`] backend.
pub async fn search<S: Store + ?Sized>(store: &S, req: &SearchRequest<'_>) -> Result<SearchResponse> {
    let q = normalize_text(req.query);
    if q.is_empty() {
        return Ok(SearchResponse::default());
    }
    let params = &req.params;

    let docs = store.get_all().await?;
    let by_id: HashMap<&str, &Document> = docs.iter().map(|d| (d.id.as_str(), d)).collect();

    struct Scored {
        keyword: f64,
        semantic: f64,
    }
    let mut scores: HashMap<&str, Scored> = HashMap::new();

    let mut keyword_matches = 0usize;
    for doc in &docs {
        if keyword_match(doc, &q) {
            keyword_matches += 1;
            scores.insert(
                doc.id.as_str(),
                Scored {
                    keyword: params.keyword_base_score,
                    semantic: 0.0,
                },
            );
        }
    }

    let mut vector_matches = 0usize;
    if let Some(qv) = req.query_vec.filter(|_| wants_semantic(&q, params)) {
        for rec in store.all_embeddings().await? {
            let Some(doc) = by_id.get(rec.document_id.as_str()) else {
                continue;
            };
            let sim = cosine_similarity(qv, &rec.vector) as f64;
            if sim <= params.relevance_threshold {
                continue;
            }
            vector_matches += 1;
            scores
                .entry(doc.id.as_str())
                .or_insert(Scored {
                    keyword: 0.0,
                    semantic: 0.0,
                })
                .semantic = sim;
        }
    }

    let mut results: Vec<SearchResultItem> = scores
        .iter()
        .filter_map(|(id, s)| {
            let doc = by_id.get(id)?;
            Some(SearchResultItem {
                id: doc.id.clone(),
                title: doc.title.clone(),
                doc_type: doc.doc_type.clone(),
                score: s.keyword + s.semantic,
                last_modified: doc.last_modified,
                snippet: snippet_of(doc),
                explain: req.explain.then(|| ScoreExplanation {
                    keyword_score: s.keyword,
                    semantic_score: s.semantic,
                    keyword_matches,
                    vector_matches,
                }),
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.last_modified.cmp(&a.last_modified))
            .then(a.id.cmp(&b.id))
    });
    results.truncate(params.final_limit);

    let mirrored: Vec<MirroredHit> = store
        .list_mirrored_messages()
        .await?
        .into_iter()
        .filter(|m| mirrored_match(m, &q))
        .take(params.fallback_limit)
        .map(|m| MirroredHit {
            id: m.id,
            subject: m.subject,
            sender: m.sender,
            received_at: m.received_at,
        })
        .collect();

    Ok(SearchResponse { results, mirrored })
}
