//! Database statistics.
//!
//! Summarizes what has been pulled so far: record counts, the time span
//! covered and the number of logged pulls per tag. Used by `peakwatch stats`
//! to check that syncs are landing where expected.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::store::{RecordStore, SqliteStore, TagStats};

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = SqliteStore::new(pool.clone());
    let tags = store.tag_stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    print!("{}", render_stats(&config.db.path.display().to_string(), db_size, &tags));

    pool.close().await;
    Ok(())
}

fn render_stats(db_path: &str, db_size: u64, tags: &[TagStats]) -> String {
    let total: u64 = tags.iter().map(|t| t.records).sum();
    let mut out = String::new();

    let _ = writeln!(out, "peakwatch database stats");
    let _ = writeln!(out, "========================");
    let _ = writeln!(out);
    let _ = writeln!(out, "  Database:    {}", db_path);
    let _ = writeln!(out, "  Size:        {}", format_bytes(db_size));
    let _ = writeln!(out);
    let _ = writeln!(out, "  Tags:        {}", tags.len());
    let _ = writeln!(out, "  Records:     {}", total);

    if !tags.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  By tag:");
        let _ = writeln!(
            out,
            "  {:<24} {:>9} {:>6}   {:<16}   {}",
            "TAG", "RECORDS", "PULLS", "FIRST", "LAST"
        );
        let _ = writeln!(out, "  {}", "-".repeat(80));
        for t in tags {
            let _ = writeln!(
                out,
                "  {:<24} {:>9} {:>6}   {:<16}   {}",
                t.tag,
                t.records,
                t.pulls,
                format_opt(t.first),
                format_opt(t.last)
            );
        }
    }

    let _ = writeln!(out);
    out
}

fn format_opt(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_timestamp;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_render_lists_tags() {
        let tags = vec![TagStats {
            tag: "#eclipse".to_string(),
            records: 42,
            first: parse_timestamp("2017-08-21 16:00:00"),
            last: None,
            pulls: 2,
        }];
        let out = render_stats("pw.sqlite", 0, &tags);
        assert!(out.contains("Records:     42"));
        assert!(out.contains("#eclipse"));
        assert!(out.contains("2017-08-21 16:00"));
    }

    #[test]
    fn test_render_empty_database() {
        let out = render_stats("pw.sqlite", 0, &[]);
        assert!(out.contains("Tags:        0"));
        assert!(!out.contains("By tag"));
    }
}
