//! Ingestion store.
//!
//! The [`RecordStore`] trait is the persistence boundary of the pipeline.
//! Records are deduplicated per tag by source id: [`insert`](RecordStore::insert)
//! refuses an id the tag already holds, so re-running a pull converges
//! instead of accumulating duplicates.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_schema`](RecordStore::ensure_schema) | Create tables if missing |
//! | [`known_ids`](RecordStore::known_ids) | Ids already stored for a tag |
//! | [`insert`](RecordStore::insert) | Insert a record unless its id is known |
//! | [`read_window`](RecordStore::read_window) | Records for a tag with `start <= ts <= end` |
//! | [`window_covered`](RecordStore::window_covered) | Whether a completed pull spans a window |
//! | [`record_pull`](RecordStore::record_pull) | Log a completed pull |
//! | [`tag_stats`](RecordStore::tag_stats) | Per-tag counts for `peakwatch stats` |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{IngestReport, IngestionWindow, Record};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Per-tag summary of stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStats {
    pub tag: String,
    pub records: u64,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub pulls: u64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the backing schema if it does not exist yet.
    async fn ensure_schema(&self, tag: &str) -> Result<()>;

    async fn known_ids(&self, tag: &str) -> Result<HashSet<u64>>;

    /// Insert `record` under `record.tag`.
    ///
    /// Returns `false` without writing when the id is already stored for
    /// that tag.
    async fn insert(&self, record: &Record) -> Result<bool>;

    /// Records for `tag` with `start <= timestamp <= end`, in ingestion order.
    async fn read_window(
        &self,
        tag: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Record>>;

    /// True when a completed pull for the same tag spans the whole window.
    async fn window_covered(&self, window: &IngestionWindow) -> Result<bool>;

    /// Log a completed pull. Returns the pull id.
    async fn record_pull(&self, window: &IngestionWindow, report: &IngestReport) -> Result<String>;

    async fn tag_stats(&self) -> Result<Vec<TagStats>>;
}
