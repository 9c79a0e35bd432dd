//! In-memory [`RecordStore`] for tests and dry runs.
//!
//! Rows are kept in insertion order behind `std::sync::RwLock`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{IngestReport, IngestionWindow, Record};

use super::{RecordStore, TagStats};

struct Pull {
    tag: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<Record>>,
    pulls: RwLock<Vec<Pull>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn ensure_schema(&self, _tag: &str) -> Result<()> {
        Ok(())
    }

    async fn known_ids(&self, tag: &str) -> Result<HashSet<u64>> {
        let records = self.records.read().unwrap();
        Ok(records.iter().filter(|r| r.tag == tag).map(|r| r.id).collect())
    }

    async fn insert(&self, record: &Record) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        if records
            .iter()
            .any(|r| r.tag == record.tag && r.id == record.id)
        {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn read_window(
        &self,
        tag: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Record>> {
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.tag == tag && start <= r.timestamp && r.timestamp <= end)
            .cloned()
            .collect())
    }

    async fn window_covered(&self, window: &IngestionWindow) -> Result<bool> {
        let pulls = self.pulls.read().unwrap();
        Ok(pulls
            .iter()
            .any(|p| p.tag == window.tag && p.start <= window.start && p.end >= window.end))
    }

    async fn record_pull(&self, window: &IngestionWindow, _report: &IngestReport) -> Result<String> {
        self.pulls.write().unwrap().push(Pull {
            tag: window.tag.clone(),
            start: window.start,
            end: window.end,
        });
        Ok(Uuid::new_v4().to_string())
    }

    async fn tag_stats(&self) -> Result<Vec<TagStats>> {
        let records = self.records.read().unwrap();
        let pulls = self.pulls.read().unwrap();

        let mut by_tag: BTreeMap<&str, TagStats> = BTreeMap::new();
        for r in records.iter() {
            let entry = by_tag.entry(&r.tag).or_insert_with(|| TagStats {
                tag: r.tag.clone(),
                records: 0,
                first: None,
                last: None,
                pulls: pulls.iter().filter(|p| p.tag == r.tag).count() as u64,
            });
            entry.records += 1;
            entry.first = Some(entry.first.map_or(r.timestamp, |f| f.min(r.timestamp)));
            entry.last = Some(entry.last.map_or(r.timestamp, |l| l.max(r.timestamp)));
        }

        let mut stats: Vec<TagStats> = by_tag.into_values().collect();
        stats.sort_by(|a, b| b.records.cmp(&a.records).then_with(|| a.tag.cmp(&b.tag)));
        Ok(stats)
    }
}
