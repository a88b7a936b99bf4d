//! `mnemo mirror import|clear`: manage the mirrored message cache.
//!
//! The cache is a read-only copy of messages from an external mailbox. It is
//! never authoritative: an import replaces it wholesale, and search only
//! appends unscored matches on subject, sender, or snippet after the ranked
//! results.

use std::path::Path;

use anyhow::{Context, Result};

use mnemo_core::models::MirroredMessage;

use crate::workspace::Workspace;

/// Read a JSON array of messages.
pub fn load_messages(path: &Path) -> Result<Vec<MirroredMessage>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read message file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse message file: {}", path.display()))
}

pub async fn run_mirror_import(ws: &Workspace, path: &Path) -> Result<()> {
    let messages = load_messages(path)?;
    ws.import_mirrored_messages(&messages).await?;
    println!("mirrored {} messages", messages.len());
    Ok(())
}

pub async fn run_mirror_clear(ws: &Workspace) -> Result<()> {
    ws.clear_mirrored_messages().await?;
    println!("mirrored message cache cleared");
    Ok(())
}
