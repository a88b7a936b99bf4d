//! `mnemo search`: hybrid keyword + semantic search from the CLI.
//!
//! Ranking happens in [`mnemo_core::search`]; this module only formats the
//! [`SearchResponse`] for humans or as JSON.

use anyhow::Result;

use mnemo_core::search::SearchResponse;

use crate::workspace::Workspace;

pub async fn run_search(ws: &Workspace, query: &str, explain: bool, json: bool) -> Result<()> {
    let response = ws.search(query, explain).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response, explain);
    }
    Ok(())
}

fn print_response(response: &SearchResponse, explain: bool) {
    if response.results.is_empty() && response.mirrored.is_empty() {
        println!("No results.");
        return;
    }

    for (i, item) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            item.score,
            item.title,
            item.doc_type
        );
        println!("    id: {}", item.id);
        println!("    updated: {}", format_ts_iso(item.last_modified));
        if !item.snippet.is_empty() {
            println!("    {}", item.snippet.replace('\n', " "));
        }
        if explain {
            if let Some(ref e) = item.explain {
                println!(
                    "    keyword={:.2} semantic={:.4} (pass sizes: keyword={}, vector={})",
                    e.keyword_score, e.semantic_score, e.keyword_matches, e.vector_matches
                );
            }
        }
        println!();
    }

    if !response.mirrored.is_empty() {
        println!("--- Mirrored messages ({}) ---", response.mirrored.len());
        for hit in &response.mirrored {
            println!("  {}  {}  <{}>", format_ts_iso(hit.received_at), hit.subject, hit.sender);
        }
    }
}

/// Format unix millis as an ISO 8601 UTC timestamp.
pub fn format_ts_iso(ts_millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_millis)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts_millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts_iso(1_700_000_000_000), "2023-11-14T22:13:20Z");
    }
}
