//! Store statistics and health overview.
//!
//! Summarizes what is stored: document counts per type, embedding coverage,
//! how many documents are linked to the remote store, and the sync cursor.
//! Works through the [`Store`](mnemo_core::store::Store) trait, so it also
//! reports on a demo-mode workspace.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::workspace::Workspace;

#[derive(Debug, Default, Serialize)]
pub struct TypeStats {
    pub documents: usize,
    pub embedded: usize,
    pub synced: usize,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub demo: bool,
    pub documents: usize,
    pub embedded: usize,
    pub synced: usize,
    pub mirrored_messages: usize,
    pub sync_cursor: Option<String>,
    pub last_modified: Option<i64>,
    pub by_type: BTreeMap<String, TypeStats>,
}

pub async fn collect_stats(ws: &Workspace, config: &Config) -> Result<Stats> {
    let store = ws.store();
    let docs = store.get_all().await?;
    let embedded_ids: std::collections::HashSet<String> = store
        .all_embeddings()
        .await?
        .into_iter()
        .map(|e| e.document_id)
        .collect();

    let mut by_type: BTreeMap<String, TypeStats> = BTreeMap::new();
    for doc in &docs {
        let entry = by_type.entry(doc.doc_type.clone()).or_default();
        entry.documents += 1;
        if embedded_ids.contains(&doc.id) {
            entry.embedded += 1;
        }
        if doc.sync_state.is_synced() {
            entry.synced += 1;
        }
    }

    let sync_cursor = if ws.sync_enabled() {
        store.get_sync_cursor(config.sync.cursor_name()).await?
    } else {
        None
    };

    Ok(Stats {
        demo: ws.is_demo(),
        documents: docs.len(),
        embedded: by_type.values().map(|t| t.embedded).sum(),
        synced: by_type.values().map(|t| t.synced).sum(),
        mirrored_messages: store.list_mirrored_messages().await?.len(),
        sync_cursor,
        last_modified: docs.iter().map(|d| d.last_modified).max(),
        by_type,
    })
}

/// Run the stats command and print a summary.
pub async fn run_stats(ws: &Workspace, config: &Config, json: bool) -> Result<()> {
    let stats = collect_stats(ws, config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("mnemo: Store Stats");
    println!("===================");
    println!();
    if stats.demo {
        println!("  Mode:        demo (in-memory, nothing is persisted)");
    } else {
        println!("  Database:    {}", config.db.path.display());
        println!("  Size:        {}", format_bytes(db_size));
    }
    println!(
        "  Embeddings:  {}",
        ws.embedding_model().unwrap_or("disabled")
    );
    println!();
    println!("  Documents:   {}", stats.documents);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.documents,
        if stats.documents > 0 {
            (stats.embedded * 100) / stats.documents
        } else {
            0
        }
    );
    println!("  Synced:      {}", stats.synced);
    println!("  Mirrored:    {} messages", stats.mirrored_messages);
    if let Some(ts) = stats.last_modified {
        println!("  Last write:  {}", format_ts_relative(ts));
    }
    if ws.sync_enabled() {
        println!(
            "  Cursor:      {}",
            stats.sync_cursor.as_deref().unwrap_or("(never pulled)")
        );
    }

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!(
            "  {:<24} {:>6} {:>10} {:>8}",
            "TYPE", "DOCS", "EMBEDDED", "SYNCED"
        );
        println!("  {}", "-".repeat(52));
        for (name, t) in &stats.by_type {
            println!(
                "  {:<24} {:>6} {:>10} {:>8}",
                name, t.documents, t.embedded, t.synced
            );
        }
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format unix millis relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts_millis: i64) -> String {
    let delta = (chrono::Utc::now().timestamp_millis() - ts_millis) / 1000;

    if delta < 0 {
        return crate::search::format_ts_iso(ts_millis);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        crate::search::format_ts_iso(ts_millis)
    }
}
