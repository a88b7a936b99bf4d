//! Backlink (mention graph) extraction.
//!
//! Backlinks are derived on demand from current document bodies and never
//! persisted, so they always reflect the latest content.
//!
//! For a target id, every other document whose body contains a mention span
//! pointing at the target contributes one [`MentionContext`] per mention: the
//! flattened text of the block that owns the mention, windowed around the
//! mention when it exceeds the context budget. Contexts are grouped per
//! source document; groups are ordered by the source's `last_modified`,
//! most recent first.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::content::Body;
use crate::models::Document;
use crate::store::{sort_recent_first, Store};

/// Marker placed where a context was cut.
pub const ELLIPSIS: &str = "…";

#[derive(Debug, Clone)]
pub struct BacklinkParams {
    /// Block texts longer than this (in chars) are windowed.
    pub context_budget: usize,
    /// Chars kept on each side of the mention when windowing.
    pub context_window: usize,
}

impl Default for BacklinkParams {
    fn default() -> Self {
        Self {
            context_budget: 200,
            context_window: 80,
        }
    }
}

/// One mention of the target inside a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionContext {
    /// Human-readable surrounding text.
    pub text: String,
    /// Char offset of the mention within its block's flattened text.
    pub position: usize,
}

/// All mentions of the target from one source document.
#[derive(Debug, Clone, Serialize)]
pub struct BacklinkGroup {
    pub source_id: String,
    pub source_title: String,
    #[serde(rename = "source_type")]
    pub source_doc_type: String,
    pub last_modified: i64,
    pub contexts: Vec<MentionContext>,
}

/// Cut `text` down to a window around the mention at `position`.
pub fn window_context(
    text: &str,
    position: usize,
    mention_len: usize,
    params: &BacklinkParams,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= params.context_budget {
        return text.to_string();
    }
    let start = position.saturating_sub(params.context_window);
    let end = (position + mention_len + params.context_window).min(chars.len());
    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

/// Mention contexts in `doc` that point at `target_id`.
///
/// Returns `None` when the body cannot be parsed.
pub fn mention_contexts(
    doc: &Document,
    target_id: &str,
    params: &BacklinkParams,
) -> Option<Vec<MentionContext>> {
    let body = match Body::parse(&doc.content) {
        Ok(body) => body,
        Err(e) => {
            debug!(doc_id = %doc.id, error = %e, "skipping unparseable body");
            return None;
        }
    };
    let mut contexts = Vec::new();
    for block in body.walk() {
        let flat = block.flatten();
        for m in flat.mentions.iter().filter(|m| m.target_id == target_id) {
            contexts.push(MentionContext {
                text: window_context(&flat.text, m.position, m.len, params),
                position: m.position,
            });
        }
    }
    Some(contexts)
}

/// Find every document that mentions `target_id`.
pub async fn find_backlinks<S: Store + ?Sized>(
    store: &S,
    target_id: &str,
    params: &BacklinkParams,
) -> Result<Vec<BacklinkGroup>> {
    let mut docs = store.get_all().await?;
    sort_recent_first(&mut docs);
    // Content is stored as JSON, so the id appears there in escaped form.
    let escaped = serde_json::to_string(target_id)?;
    let needle = escaped
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(target_id);

    let mut groups = Vec::new();
    for doc in docs {
        if doc.id == target_id
            || !(doc.content.contains(needle) || doc.content.contains(target_id))
        {
            continue;
        }
        let Some(contexts) = mention_contexts(&doc, target_id, params) else {
            continue;
        };
        if contexts.is_empty() {
            continue;
        }
        groups.push(BacklinkGroup {
            source_id: doc.id,
            source_title: doc.title,
            source_doc_type: doc.doc_type,
            last_modified: doc.last_modified,
            contexts,
        });
    }
    Ok(groups)
}

/// Forward links of a document: body mentions then metadata references,
/// first occurrence wins, self-references dropped.
pub fn outgoing_references(doc: &Document) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let from_body = Body::parse(&doc.content)
        .map(|b| b.mentioned_ids())
        .unwrap_or_default();
    let from_meta = doc.metadata_references().map(str::to_string);
    for id in from_body.into_iter().chain(from_meta) {
        if id != doc.id && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Block, BlockKind, Span};
    use crate::models::{Property, PropertyValue};
    use crate::store::memory::InMemoryStore;

    fn doc_with(id: &str, markup: &str, ts: i64) -> Document {
        let mut d = Document::new(format!("Doc {}", id), "note");
        d.id = id.to_string();
        d.content = Body::from_markup(markup).to_json();
        d.last_modified = ts;
        d
    }

    #[test]
    fn test_window_short_text_untouched() {
        let params = BacklinkParams::default();
        assert_eq!(window_context("short @B", 6, 2, &params), "short @B");
    }

    #[test]
    fn test_window_adds_ellipsis_on_cut_sides() {
        let params = BacklinkParams {
            context_budget: 10,
            context_window: 3,
        };
        let text = "0123456789@B0123456789";
        assert_eq!(window_context(text, 10, 2, &params), "…789@B012…");
        assert_eq!(window_context(text, 0, 2, &params), "01234…");
        assert_eq!(window_context(text, 20, 2, &params), "…56789");
    }

    #[tokio::test]
    async fn test_ids_needing_json_escapes_are_found() {
        let store = InMemoryStore::new();
        for target in [r"notes\2024", r#"say "hi""#] {
            let mut source = doc_with("A", "", 1);
            source.content = Body {
                blocks: vec![Block::new(
                    BlockKind::Paragraph,
                    vec![Span::text("see "), Span::mention(target, "it")],
                )],
            }
            .to_json();
            store.put(&source).await.unwrap();

            let groups = find_backlinks(&store, target, &BacklinkParams::default())
                .await
                .unwrap();
            assert_eq!(groups.len(), 1, "target {:?}", target);
            assert_eq!(groups[0].contexts.len(), 1);
            assert_eq!(groups[0].contexts[0].text, "see @it");
        }
    }

    #[tokio::test]
    async fn test_counts_every_mention() {
        let store = InMemoryStore::new();
        store.put(&doc_with("B", "target", 1)).await.unwrap();
        store
            .put(&doc_with(
                "A",
                "first @[[B]] and @[[B|Bee]]\n\n- again @[[B]]\n\nunrelated @[[C]]",
                5,
            ))
            .await
            .unwrap();

        let groups = find_backlinks(&store, "B", &BacklinkParams::default())
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source_id, "A");
        assert_eq!(groups[0].contexts.len(), 3);
        assert_eq!(groups[0].contexts[0].text, "first @B and @Bee");
        assert_eq!(groups[0].contexts[1].position, 13);
        assert_eq!(groups[0].contexts[2].text, "again @B");
    }

    #[tokio::test]
    async fn test_groups_sorted_by_recency_and_self_excluded() {
        let store = InMemoryStore::new();
        store.put(&doc_with("T", "self @[[T]]", 99)).await.unwrap();
        store.put(&doc_with("old", "see @[[T]]", 1)).await.unwrap();
        store.put(&doc_with("new", "see @[[T]]", 50)).await.unwrap();
        store.put(&doc_with("none", "nothing", 70)).await.unwrap();

        let groups = find_backlinks(&store, "T", &BacklinkParams::default())
            .await
            .unwrap();
        let ids: Vec<&str> = groups.iter().map(|g| g.source_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_malformed_body_skipped() {
        let store = InMemoryStore::new();
        let mut bad = doc_with("bad", "", 10);
        bad.content = "<p>@[[T]] in html</p>".to_string();
        store.put(&bad).await.unwrap();
        store.put(&doc_with("good", "ok @[[T]]", 5)).await.unwrap();

        let groups = find_backlinks(&store, "T", &BacklinkParams::default())
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source_id, "good");
    }

    #[tokio::test]
    async fn test_long_block_is_windowed() {
        let store = InMemoryStore::new();
        let mut src = doc_with("src", "", 1);
        let long = "x".repeat(300);
        let body = Body {
            blocks: vec![Block::new(
                BlockKind::Paragraph,
                vec![
                    Span::text(long.clone()),
                    Span::mention("T", "Target"),
                    Span::text(long),
                ],
            )],
        };
        src.content = body.to_json();
        store.put(&src).await.unwrap();

        let groups = find_backlinks(&store, "T", &BacklinkParams::default())
            .await
            .unwrap();
        let ctx = &groups[0].contexts[0];
        assert_eq!(ctx.position, 300);
        assert!(ctx.text.starts_with(ELLIPSIS));
        assert!(ctx.text.ends_with(ELLIPSIS));
        assert!(ctx.text.contains("@Target"));
        assert_eq!(ctx.text.chars().count(), 80 + 7 + 80 + 2);
    }

    #[test]
    fn test_outgoing_references() {
        let mut d = doc_with("me", "@[[a]] @[[b]] @[[a]] @[[me]]", 1);
        d.metadata.push(Property {
            key: "attendee".to_string(),
            value: PropertyValue::Reference("c".to_string()),
        });
        d.metadata.push(Property {
            key: "company".to_string(),
            value: PropertyValue::Reference("b".to_string()),
        });
        assert_eq!(outgoing_references(&d), vec!["a", "b", "c"]);
    }
}
