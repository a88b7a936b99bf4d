//! Document retrieval: `mnemo get`, `mnemo list`, and `mnemo backlinks`.

use anyhow::{bail, Result};
use serde::Serialize;

use mnemo_core::backlinks::BacklinkGroup;
use mnemo_core::content::plain_text_of;
use mnemo_core::models::{Document, PropertyValue};

use crate::search::format_ts_iso;
use crate::workspace::Workspace;

/// A document with its link neighbourhood, as printed by `mnemo get --json`.
#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub document: Document,
    pub text: String,
    pub links_to: Vec<LinkView>,
    pub backlinks: Vec<BacklinkGroup>,
}

#[derive(Debug, Serialize)]
pub struct LinkView {
    pub id: String,
    pub title: String,
}

pub async fn load_document_view(ws: &Workspace, id: &str) -> Result<DocumentView> {
    let Some(document) = ws.get(id).await? else {
        bail!("document not found: {}", id);
    };
    let links_to = ws
        .outgoing(id)
        .await?
        .into_iter()
        .map(|d| LinkView {
            id: d.id,
            title: d.title,
        })
        .collect();
    let backlinks = ws.backlinks(id).await?;
    Ok(DocumentView {
        text: plain_text_of(&document.content),
        document,
        links_to,
        backlinks,
    })
}

pub async fn run_get(ws: &Workspace, id: &str, json: bool) -> Result<()> {
    let view = load_document_view(ws, id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let doc = &view.document;
    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("title:         {}", doc.title);
    println!("type:          {}", doc.doc_type);
    println!("last_modified: {}", format_ts_iso(doc.last_modified));
    if !doc.tags.is_empty() {
        let tags: Vec<&str> = doc.tags.iter().map(String::as_str).collect();
        println!("tags:          {}", tags.join(", "));
    }
    if doc.pinned {
        println!("pinned:        yes");
    }
    match doc.remote_ref() {
        Some(r) => println!("remote:        {}", r),
        None => println!("remote:        (local only)"),
    }
    for prop in &doc.metadata {
        println!("  {} = {}", prop.key, format_value(&prop.value));
    }
    println!();

    println!("--- Body ---");
    println!("{}", view.text);
    println!();

    if !view.links_to.is_empty() {
        println!("--- Links to ({}) ---", view.links_to.len());
        for link in &view.links_to {
            println!("  {}  {}", link.id, link.title);
        }
        println!();
    }

    print_backlinks(&view.backlinks);
    Ok(())
}

pub async fn run_list(
    ws: &Workspace,
    doc_type: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let docs = ws.list(doc_type, limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &docs {
        let pin = if doc.pinned { "*" } else { " " };
        println!(
            "{} {}  {}  [{}]  {}",
            pin,
            doc.id,
            format_ts_iso(doc.last_modified),
            doc.doc_type,
            doc.title
        );
    }
    Ok(())
}

pub async fn run_backlinks(ws: &Workspace, id: &str, json: bool) -> Result<()> {
    if ws.get(id).await?.is_none() {
        bail!("document not found: {}", id);
    }
    let groups = ws.backlinks(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else {
        print_backlinks(&groups);
    }
    Ok(())
}

fn print_backlinks(groups: &[BacklinkGroup]) {
    let total: usize = groups.iter().map(|g| g.contexts.len()).sum();
    println!("--- Backlinks ({} mentions in {} documents) ---", total, groups.len());
    for group in groups {
        println!(
            "{} ({}, {})",
            group.source_title,
            group.source_doc_type,
            format_ts_iso(group.last_modified)
        );
        for ctx in &group.contexts {
            println!("    {}", ctx.text);
        }
    }
}

fn format_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Text(s) | PropertyValue::Date(s) => s.clone(),
        PropertyValue::Number(n) => n.to_string(),
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::Reference(id) => format!("-> {}", id),
    }
}
