//! Structured document body.
//!
//! A document's `content` field is the JSON serialization of a [`Body`]:
//! a tree of block-level containers, each holding a list of typed inline
//! spans. Mentions of other documents are spans rather than markup, so the
//! backlink extractor and the keyword index read positions straight from
//! this representation without walking rendered HTML.
//!
//! # Markup
//!
//! [`Body::from_markup`] builds a body from a small plain-text syntax used by
//! the CLI:
//!
//! | Syntax | Result |
//! |--------|--------|
//! | blank line | paragraph break |
//! | `# text` | heading |
//! | `- text` | list item |
//! | `- [ ] text` | task |
//! | `> text` | quote |
//! | `@[[id]]`, `@[[id\|label]]` | mention of document `id` |
//! | `#word` | tag |
//!
//! ```rust
//! use mnemo_core::content::Body;
//!
//! let body = Body::from_markup("See @[[42|Budget]] for #finance numbers.");
//! assert_eq!(body.mentioned_ids(), vec!["42".to_string()]);
//! assert_eq!(body.plain_text(), "See @Budget for #finance numbers.");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to interpret stored content as a [`Body`].
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content is empty")]
    Empty,
    #[error("malformed body: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    #[default]
    Paragraph,
    Heading,
    ListItem,
    Quote,
    Code,
    Task,
}

/// Inline content of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Span {
    Text {
        text: String,
    },
    Mention {
        id: String,
        #[serde(default)]
        label: String,
    },
    Tag {
        name: String,
    },
}

impl Span {
    pub fn text(text: impl Into<String>) -> Self {
        Span::Text { text: text.into() }
    }

    pub fn mention(id: impl Into<String>, label: impl Into<String>) -> Self {
        Span::Mention {
            id: id.into(),
            label: label.into(),
        }
    }

    fn render(&self) -> String {
        match self {
            Span::Text { text } => text.clone(),
            Span::Mention { id, label } if label.is_empty() => format!("@{}", id),
            Span::Mention { label, .. } => format!("@{}", label),
            Span::Tag { name } => format!("#{}", name),
        }
    }
}

/// A block-level container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub spans: Vec<Span>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

/// A mention located inside a flattened block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionPosition {
    pub target_id: String,
    /// Char offset of the rendered mention in [`FlatBlock::text`].
    pub position: usize,
    /// Rendered length in chars.
    pub len: usize,
}

/// The text of one block with its own spans rendered, children excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBlock {
    pub text: String,
    pub mentions: Vec<MentionPosition>,
}

impl Block {
    pub fn new(kind: BlockKind, spans: Vec<Span>) -> Self {
        Self {
            kind,
            spans,
            children: Vec::new(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, vec![Span::text(text)])
    }

    /// Render this block's own spans into text, recording mention positions.
    pub fn flatten(&self) -> FlatBlock {
        let mut text = String::new();
        let mut chars = 0usize;
        let mut mentions = Vec::new();
        for span in &self.spans {
            let rendered = span.render();
            let len = rendered.chars().count();
            if let Span::Mention { id, .. } = span {
                mentions.push(MentionPosition {
                    target_id: id.clone(),
                    position: chars,
                    len,
                });
            }
            text.push_str(&rendered);
            chars += len;
        }
        FlatBlock { text, mentions }
    }
}

/// Root of a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Body {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Body {
    /// Parse stored content.
    pub fn parse(content: &str) -> Result<Self, ContentError> {
        if content.trim().is_empty() {
            return Err(ContentError::Empty);
        }
        Ok(serde_json::from_str(content)?)
    }

    /// Serialize for storage in `Document::content`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"blocks\":[]}".to_string())
    }

    /// Every block in document order (pre-order, parents before children).
    pub fn walk(&self) -> Vec<&Block> {
        fn visit<'a>(block: &'a Block, out: &mut Vec<&'a Block>) {
            out.push(block);
            for child in &block.children {
                visit(child, out);
            }
        }
        let mut out = Vec::new();
        for block in &self.blocks {
            visit(block, &mut out);
        }
        out
    }

    /// All block texts joined by newlines.
    pub fn plain_text(&self) -> String {
        self.walk()
            .into_iter()
            .map(|b| b.flatten().text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Mention targets in document order, duplicates kept.
    pub fn mentioned_ids(&self) -> Vec<String> {
        self.walk()
            .into_iter()
            .flat_map(|b| b.spans.iter())
            .filter_map(|s| match s {
                Span::Mention { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Build a body from the CLI markup described in the module docs.
    pub fn from_markup(markup: &str) -> Self {
        let mut blocks = Vec::new();
        for paragraph in markup.split("\n\n") {
            let mut pending: Vec<&str> = Vec::new();
            for line in paragraph.lines() {
                let line = line.trim_end();
                if line.trim().is_empty() {
                    continue;
                }
                match line_block(line) {
                    Some(block) => {
                        flush_paragraph(&mut pending, &mut blocks);
                        blocks.push(block);
                    }
                    None => pending.push(line.trim()),
                }
            }
            flush_paragraph(&mut pending, &mut blocks);
        }
        Body { blocks }
    }
}

/// Plain text of stored content; unparseable content is returned as-is.
pub fn plain_text_of(content: &str) -> String {
    match Body::parse(content) {
        Ok(body) => body.plain_text(),
        Err(_) => content.to_string(),
    }
}

fn flush_paragraph(pending: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if pending.is_empty() {
        return;
    }
    let joined = pending.join(" ");
    blocks.push(Block::new(BlockKind::Paragraph, parse_inline(&joined)));
    pending.clear();
}

fn line_block(line: &str) -> Option<Block> {
    let trimmed = line.trim_start();
    let (kind, rest) = if let Some(rest) = trimmed.strip_prefix("- [ ] ") {
        (BlockKind::Task, rest)
    } else if let Some(rest) = trimmed.strip_prefix("# ") {
        (BlockKind::Heading, rest)
    } else if let Some(rest) = trimmed.strip_prefix("- ") {
        (BlockKind::ListItem, rest)
    } else if let Some(rest) = trimmed.strip_prefix("> ") {
        (BlockKind::Quote, rest)
    } else {
        return None;
    };
    Some(Block::new(kind, parse_inline(rest.trim())))
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '/')
}

fn parse_inline(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut buf = String::new();
    let mut rest = text;
    let mut at_boundary = true;

    while let Some(c) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("@[[") {
            if let Some(end) = after.find("]]") {
                let inner = &after[..end];
                let (id, label) = inner.split_once('|').unwrap_or((inner, ""));
                if !id.trim().is_empty() {
                    flush_text(&mut buf, &mut spans);
                    spans.push(Span::mention(id.trim(), label.trim()));
                    rest = &after[end + 2..];
                    at_boundary = false;
                    continue;
                }
            }
        }
        if c == '#' && at_boundary {
            let name: String = rest[1..].chars().take_while(|c| is_tag_char(*c)).collect();
            if !name.is_empty() {
                flush_text(&mut buf, &mut spans);
                rest = &rest[1 + name.len()..];
                spans.push(Span::Tag { name });
                at_boundary = false;
                continue;
            }
        }
        buf.push(c);
        at_boundary = c.is_whitespace() || matches!(c, '(' | '[' | ',');
        rest = &rest[c.len_utf8()..];
    }
    flush_text(&mut buf, &mut spans);
    spans
}

fn flush_text(buf: &mut String, spans: &mut Vec<Span>) {
    if !buf.is_empty() {
        spans.push(Span::text(std::mem::take(buf)));
    }
}
