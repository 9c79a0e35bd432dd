//! Core data models used throughout peakwatch.
//!
//! These types represent the records, buckets, and peaks that flow through
//! the ingestion and analysis pipeline.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Storage format for record timestamps (`tweets.datetime`).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single post returned by the record source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: u64,
    pub tag: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Normalize a user-supplied tag so `"rust"` and `"#rust"` name the same topic.
///
/// Surrounding whitespace is trimmed and a leading `#` is added when missing.
pub fn normalize_tag(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{}", trimmed)
    }
}

/// The (tag, start, end) triple a run is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionWindow {
    pub tag: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl IngestionWindow {
    pub fn new(tag: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidWindow { start, end });
        }
        Ok(Self {
            tag: normalize_tag(tag),
            start,
            end,
        })
    }

    /// `since` date sent to the source (inclusive).
    pub fn since_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// `until` date sent to the source: the end date plus one day, since the
    /// source treats `until` as exclusive.
    pub fn until_date(&self) -> NaiveDate {
        (self.end + Duration::days(1)).date_naive()
    }

    /// Inclusive filter applied to persisted records.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// A fixed-width time slice of the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub index: usize,
    pub start: DateTime<Utc>,
    pub count: u32,
    pub texts: Vec<String>,
}

/// Dense, gap-filled bucket series. `buckets[i].index == i` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSeries {
    pub start: DateTime<Utc>,
    pub interval_secs: i64,
    pub buckets: Vec<Bucket>,
}

impl BucketSeries {
    pub fn counts(&self) -> Vec<u32> {
        self.buckets.iter().map(|b| b.count).collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|b| b.count as u64).sum()
    }
}

/// A detected burst and the buckets it claims.
#[derive(Debug, Clone, Serialize)]
pub struct Peak {
    pub location: usize,
    pub magnitude: u32,
    /// Start of the bucket at `location`.
    pub time: DateTime<Utc>,
    /// Ascending bucket indices.
    pub member_buckets: Vec<usize>,
    pub aggregated_text: Vec<String>,
    /// `None` marks an unlabeled peak (no keyphrase could be extracted).
    pub keyword: Option<String>,
}

/// Counters from one ingestion pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub pages: u64,
    pub fetched: u64,
    pub inserted: u64,
    pub skipped_known: u64,
    /// Timestamp of the newest record the source returned, in or after the
    /// window.
    pub newest: Option<DateTime<Utc>>,
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub run_id: String,
    pub window: IngestionWindow,
    /// Present when the run pulled from the source.
    pub ingest: Option<IngestReport>,
    pub series: BucketSeries,
    pub peaks: Vec<Peak>,
    pub background: Vec<usize>,
}

/// Parse a timestamp given on the command line.
///
/// Accepts `YYYY-MM-DD-HH-MM`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// and RFC 3339. Naive forms are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d-%H-%M", DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Format a timestamp for the `tweets.datetime` column.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}
