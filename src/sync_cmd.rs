//! `mnemo sync pull`: pull remote changes on demand.

use anyhow::Result;

use crate::workspace::Workspace;

pub async fn run_sync_pull(ws: &Workspace, json: bool) -> Result<()> {
    let report = ws.pull().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("sync pull");
    println!("  applied: {}", report.applied);
    println!("  removed: {}", report.removed);
    println!("  skipped: {}", report.skipped);
    println!("  failed:  {}", report.failed);
    match report.cursor {
        Some(c) => println!("  cursor:  {}", c),
        None => println!("  cursor:  unchanged (failed records are retried on the next pull)"),
    }
    Ok(())
}
