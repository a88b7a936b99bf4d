//! `mnemo embed pending|rebuild`: backfill document embeddings.

use anyhow::Result;

use crate::workspace::Workspace;

/// Embed documents whose vector is missing or stale.
pub async fn run_embed_pending(ws: &Workspace) -> Result<()> {
    let report = ws.embed_documents(false).await?;
    println!("embed pending");
    if report.total == 0 {
        println!("  all documents up to date");
        return Ok(());
    }
    println!("  total pending: {}", report.total);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);
    Ok(())
}

/// Delete every embedding and regenerate all of them.
pub async fn run_embed_rebuild(ws: &Workspace) -> Result<()> {
    let report = ws.embed_documents(true).await?;
    println!("embed rebuild: cleared existing embeddings");
    println!("  total: {}", report.total);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);
    Ok(())
}
