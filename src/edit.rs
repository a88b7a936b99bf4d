//! Authoring commands: `mnemo new`, `mnemo edit`, `mnemo delete`.
//!
//! Bodies are written in the lightweight markup understood by
//! [`Body::from_markup`]: blank-line separated paragraphs, `@[[id|label]]`
//! mentions, and `#tag` spans. Metadata is given as `key=value` pairs and
//! typed through the document type's schema.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use tracing::warn;

use mnemo_core::content::Body;
use mnemo_core::models::{Document, Property, PropertyKind, PropertyValue, TypeSchema};
use mnemo_core::sync::PushOutcome;

use crate::workspace::{SaveReport, Workspace};

/// Field changes shared by `new` and `edit`.
#[derive(Debug, Default, Clone)]
pub struct DocumentEdits {
    pub title: Option<String>,
    pub body: Option<String>,
    pub body_file: Option<PathBuf>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    /// Raw `key=value` pairs.
    pub props: Vec<String>,
    pub pinned: Option<bool>,
}

/// Type a raw `key=value` pair according to `schema`.
///
/// Keys the schema doesn't define become text.
pub fn parse_property(schema: Option<&TypeSchema>, raw: &str) -> Result<Property> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("property must be key=value: {}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("property key is empty: {}", raw);
    }
    let value = value.trim();
    let kind = schema
        .and_then(|s| s.properties.iter().find(|p| p.key == key))
        .map(|p| p.kind)
        .unwrap_or(PropertyKind::Text);

    let value = match kind {
        PropertyKind::Text => PropertyValue::Text(value.to_string()),
        PropertyKind::Number => PropertyValue::Number(
            value
                .parse()
                .with_context(|| format!("property {} expects a number", key))?,
        ),
        PropertyKind::Boolean => PropertyValue::Boolean(
            value
                .parse()
                .with_context(|| format!("property {} expects true or false", key))?,
        ),
        PropertyKind::Date => {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .with_context(|| format!("property {} expects a YYYY-MM-DD date", key))?;
            PropertyValue::Date(value.to_string())
        }
        PropertyKind::Reference => PropertyValue::Reference(value.to_string()),
    };
    Ok(Property {
        key: key.to_string(),
        value,
    })
}

/// Apply `edits` to `doc` in place.
pub fn apply_edits(doc: &mut Document, edits: &DocumentEdits, schema: Option<&TypeSchema>) -> Result<()> {
    if let Some(ref title) = edits.title {
        doc.title = title.clone();
    }

    let markup = match (&edits.body, &edits.body_file) {
        (Some(_), Some(_)) => bail!("use either --body or --body-file, not both"),
        (Some(b), None) => Some(b.clone()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read body file: {}", path.display()))?,
        ),
        (None, None) => None,
    };
    if let Some(markup) = markup {
        doc.content = Body::from_markup(&markup).to_json();
    }

    for tag in &edits.add_tags {
        doc.tags.insert(tag.trim_start_matches('#').to_string());
    }
    for tag in &edits.remove_tags {
        doc.tags.remove(tag.trim_start_matches('#'));
    }

    for raw in &edits.props {
        let prop = parse_property(schema, raw)?;
        match doc.metadata.iter_mut().find(|p| p.key == prop.key) {
            Some(existing) => existing.value = prop.value,
            None => doc.metadata.push(prop),
        }
    }

    if let Some(pinned) = edits.pinned {
        doc.pinned = pinned;
    }

    if let Some(schema) = schema {
        for def in schema.properties.iter().filter(|d| d.required) {
            if !doc.metadata.iter().any(|p| p.key == def.key) {
                warn!(doc_type = %schema.name, key = %def.key, "required property missing");
            }
        }
    }
    Ok(())
}

async fn schema_for(ws: &Workspace, doc_type: &str) -> Result<Option<TypeSchema>> {
    Ok(ws
        .type_schemas()
        .await?
        .into_iter()
        .find(|s| s.name == doc_type))
}

fn print_save(action: &str, report: &SaveReport) {
    println!("{} {}", action, report.document.id);
    println!("  title:    {}", report.document.title);
    println!("  embedded: {}", if report.embedded { "yes" } else { "no" });
    match &report.push {
        PushOutcome::Skipped => println!("  push:     skipped (sync disabled)"),
        PushOutcome::Created(r) => println!("  push:     created remote {}", r),
        PushOutcome::Updated => println!("  push:     updated"),
        PushOutcome::Failed(msg) => println!("  push:     failed ({}), will retry on next save", msg),
    }
}

pub async fn run_new(ws: &Workspace, title: &str, doc_type: &str, edits: &DocumentEdits) -> Result<()> {
    let schema = schema_for(ws, doc_type).await?;
    if schema.is_none() {
        warn!(doc_type, "no type schema defined; properties are stored as text");
    }
    let mut doc = Document::new(title, doc_type);
    apply_edits(&mut doc, edits, schema.as_ref())?;
    let report = ws.save(doc).await?;
    print_save("created", &report);
    Ok(())
}

pub async fn run_edit(ws: &Workspace, id: &str, edits: &DocumentEdits) -> Result<()> {
    let Some(mut doc) = ws.get(id).await? else {
        bail!("document not found: {}", id);
    };
    let schema = schema_for(ws, &doc.doc_type).await?;
    apply_edits(&mut doc, edits, schema.as_ref())?;
    let report = ws.save(doc).await?;
    print_save("updated", &report);
    Ok(())
}

pub async fn run_delete(ws: &Workspace, id: &str) -> Result<()> {
    let report = ws.delete(id).await?;
    if !report.existed {
        println!("nothing to delete: {}", id);
        return Ok(());
    }
    println!("deleted {}", id);
    println!("  remote: {}", serde_json::to_string(&report.remote)?);
    Ok(())
}
