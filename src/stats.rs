//! Knowledge base statistics for `rag stats`.
//!
//! Prints what the engine reports through [`RagEngine::get_statistics`]:
//! document and chunk counts, the stored embedding dimension and model,
//! and a per-file breakdown.

use anyhow::Result;

use crate::config::Config;
use crate::engine::RagEngine;
use crate::models::Statistics;

/// Run the stats command: query the engine and print a summary.
pub async fn run_stats(config: &Config, engine: &RagEngine, json: bool) -> Result<()> {
    let stats = engine.get_statistics().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let indexed_at = engine.indexed_at().await.ok().flatten();
    print_stats(&stats, db_size, indexed_at);
    Ok(())
}

fn print_stats(stats: &Statistics, db_size: u64, indexed_at: Option<i64>) {
    println!("LeapLogic RAG — Knowledge Base Stats");
    println!("====================================");
    println!();
    println!("  Database:    {}", stats.database_path);
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.total_documents);
    println!("  Chunks:      {}", stats.total_chunks);
    println!(
        "  Embedding:   {} ({} dims)",
        stats.embedding_model.as_deref().unwrap_or("none"),
        stats
            .embedding_dim
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  Indexed:     {}",
        indexed_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.documents.is_empty() {
        println!();
        println!("  By file:");
        println!("  {:<56} {:>8}", "FILE", "CHUNKS");
        println!("  {}", "-".repeat(66));
        for doc in &stats.documents {
            println!("  {:<56} {:>8}", doc.filename, doc.chunk_count);
        }
    }

    println!();
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

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
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
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
