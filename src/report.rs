//! Rendering of [`AnalysisResult`] for the command line.
//!
//! `text` prints a header, a one-line-per-bucket count timeline and the
//! labelled peaks; `json` prints the whole result with `serde_json`.

use anyhow::{bail, Result};
use std::fmt::Write as _;

use crate::models::{AnalysisResult, IngestReport};

/// Width of the longest timeline bar.
const BAR_WIDTH: u32 = 40;

pub fn render(result: &AnalysisResult, format: &str) -> Result<String> {
    match format {
        "text" => Ok(render_text(result)),
        "json" => Ok(serde_json::to_string_pretty(result)?),
        other => bail!("Unknown format: '{}'. Must be text or json.", other),
    }
}

pub fn render_ingest(tag: &str, report: Option<&IngestReport>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "sync {}", tag);
    match report {
        Some(r) => {
            let _ = writeln!(out, "  pages: {}", r.pages);
            let _ = writeln!(out, "  fetched: {}", r.fetched);
            let _ = writeln!(out, "  inserted: {}", r.inserted);
            let _ = writeln!(out, "  already stored: {}", r.skipped_known);
        }
        None => {
            let _ = writeln!(out, "  window already pulled (use --full to pull again)");
        }
    }
    out.push_str("ok\n");
    out
}

fn render_text(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let w = &result.window;
    let series = &result.series;

    let _ = writeln!(out, "analysis {}", w.tag);
    let _ = writeln!(
        out,
        "  window: {} .. {}",
        w.start.format("%Y-%m-%d %H:%M:%S"),
        w.end.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(ingest) = &result.ingest {
        let _ = writeln!(
            out,
            "  pulled: {} fetched, {} new",
            ingest.fetched, ingest.inserted
        );
    }
    let _ = writeln!(out, "  records: {}", series.total());
    let _ = writeln!(
        out,
        "  buckets: {} x {}s",
        series.len(),
        series.interval_secs
    );
    let _ = writeln!(out);

    let max = series.buckets.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    for b in &series.buckets {
        let marker = if result.peaks.iter().any(|p| p.location == b.index) {
            '*'
        } else {
            ' '
        };
        let bar = "#".repeat((b.count * BAR_WIDTH / max) as usize);
        let _ = writeln!(
            out,
            "{} {} {:>6} {}",
            marker,
            b.start.format("%H:%M:%S"),
            b.count,
            bar
        );
    }
    let _ = writeln!(out);

    if result.peaks.is_empty() {
        let _ = writeln!(out, "No peaks found.");
        return out;
    }

    let _ = writeln!(out, "{:<4} {:<20} {:>6} {:>8}  KEYWORD", "#", "TIME", "COUNT", "BUCKETS");
    for (i, p) in result.peaks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<4} {:<20} {:>6} {:>8}  {}",
            i + 1,
            p.time.format("%Y-%m-%d %H:%M:%S"),
            p.magnitude,
            p.member_buckets.len(),
            p.keyword.as_deref().unwrap_or("(unlabeled)")
        );
    }
    let _ = writeln!(out, "  background buckets: {}", result.background.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_timestamp, Bucket, BucketSeries, IngestionWindow, Peak};
    use chrono::Duration;

    fn sample() -> AnalysisResult {
        let start = parse_timestamp("2017-08-21 17:00:00").unwrap();
        let buckets: Vec<Bucket> = [1u32, 6, 2]
            .iter()
            .enumerate()
            .map(|(index, &count)| Bucket {
                index,
                start: start + Duration::minutes(index as i64),
                count,
                texts: Vec::new(),
            })
            .collect();
        AnalysisResult {
            run_id: "run".to_string(),
            window: IngestionWindow::new("eclipse", start, start + Duration::minutes(3)).unwrap(),
            ingest: None,
            series: BucketSeries {
                start,
                interval_secs: 60,
                buckets,
            },
            peaks: vec![Peak {
                location: 1,
                magnitude: 6,
                time: start + Duration::minutes(1),
                member_buckets: vec![0, 1, 2],
                aggregated_text: Vec::new(),
                keyword: Some("totality".to_string()),
            }],
            background: Vec::new(),
        }
    }

    #[test]
    fn test_text_report_lists_peaks() {
        let text = render(&sample(), "text").unwrap();
        assert!(text.contains("analysis #eclipse"));
        assert!(text.contains("records: 9"));
        assert!(text.contains("* 17:01:00"));
        assert!(text.contains("totality"));
    }

    #[test]
    fn test_json_report_carries_series() {
        let json = render(&sample(), "json").unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["peaks"][0]["keyword"], "totality");
        assert_eq!(v["series"]["buckets"].as_array().unwrap().len(), 3);
        assert_eq!(v["window"]["tag"], "#eclipse");
    }

    #[test]
    fn test_unknown_format() {
        assert!(render(&sample(), "yaml").is_err());
    }
}
