//! Ingestion loop.
//!
//! Pages backwards through the source from a resolved id, persisting every
//! record the store does not already hold for the tag. The loop stops when a
//! page comes back empty, when a page reaches back past the window start, or
//! when `max_records` have been fetched. Interrupted pulls can simply be
//! re-run: already stored ids are skipped.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::models::{IngestReport, IngestionWindow};
use crate::source::{RecordSource, SearchRequest};
use crate::store::RecordStore;

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub page_size: u32,
    pub max_records: u64,
}

impl From<&SourceConfig> for IngestSettings {
    fn from(cfg: &SourceConfig) -> Self {
        Self {
            page_size: cfg.page_size,
            max_records: cfg.max_records,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&SourceConfig::default())
    }
}

/// Pull `window` into `store`, starting at `start_id` (inclusive).
pub async fn pull_window(
    source: &dyn RecordSource,
    store: &dyn RecordStore,
    window: &IngestionWindow,
    start_id: u64,
    settings: &IngestSettings,
) -> Result<IngestReport> {
    let mut known: HashSet<u64> = store.known_ids(&window.tag).await?;
    let mut report = IngestReport::default();
    let mut max_id = start_id;

    debug!(tag = %window.tag, known = known.len(), start_id, "starting pull");

    while report.fetched < settings.max_records {
        let request = SearchRequest::new(&window.tag, settings.page_size)
            .max_id(max_id)
            .since(window.since_date())
            .until(window.until_date());
        let page = source.search(&request).await?;

        let Some(oldest) = page.iter().min_by_key(|r| r.id) else {
            debug!(tag = %window.tag, "no more records");
            break;
        };
        let oldest_id = oldest.id;
        let reached_start = oldest.timestamp < window.start;

        report.pages += 1;
        report.fetched += page.len() as u64;
        if let Some(top) = page.iter().map(|r| r.timestamp).max() {
            report.newest = Some(report.newest.map_or(top, |n| n.max(top)));
        }

        for record in page.iter().filter(|r| r.timestamp >= window.start) {
            if known.contains(&record.id) {
                report.skipped_known += 1;
                continue;
            }
            if store.insert(record).await? {
                report.inserted += 1;
            } else {
                report.skipped_known += 1;
            }
            known.insert(record.id);
        }

        if reached_start {
            debug!(tag = %window.tag, "exhausted time interval");
            break;
        }
        if oldest_id == 0 || oldest_id > max_id {
            warn!(oldest_id, max_id, "source returned ids above max_id, stopping");
            break;
        }
        max_id = oldest_id - 1;
    }

    info!(
        tag = %window.tag,
        pages = report.pages,
        fetched = report.fetched,
        inserted = report.inserted,
        skipped = report.skipped_known,
        "pull finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_timestamp, Record};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Serves a fixed corpus and remembers every request.
    struct Corpus {
        records: Vec<Record>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    #[async_trait]
    impl RecordSource for Corpus {
        async fn search(&self, req: &SearchRequest) -> Result<Vec<Record>> {
            self.requests.lock().unwrap().push(req.clone());
            let mut out: Vec<Record> = self
                .records
                .iter()
                .filter(|r| req.max_id.map_or(true, |m| r.id <= m))
                .cloned()
                .collect();
            out.sort_by(|a, b| b.id.cmp(&a.id));
            out.truncate(req.count as usize);
            Ok(out)
        }
    }

    fn corpus(n: u64) -> Corpus {
        let base = parse_timestamp("2017-08-21 10:00:00").unwrap();
        Corpus {
            records: (0..n)
                .map(|i| Record {
                    id: 100 + i,
                    tag: "#t".into(),
                    timestamp: base + Duration::minutes(i as i64),
                    text: format!("post {}", i),
                })
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn window() -> IngestionWindow {
        IngestionWindow::new(
            "#t",
            parse_timestamp("2017-08-21 10:05:00").unwrap(),
            parse_timestamp("2017-08-21 10:14:00").unwrap(),
        )
        .unwrap()
    }

    fn settings(page_size: u32) -> IngestSettings {
        IngestSettings {
            page_size,
            max_records: 1_000,
        }
    }

    #[tokio::test]
    async fn test_pages_back_to_window_start() {
        let source = corpus(20);
        let store = InMemoryStore::new();
        // id 114 is 10:14
        let report = pull_window(&source, &store, &window(), 114, &settings(4))
            .await
            .unwrap();

        assert_eq!(report.inserted, 10);
        assert_eq!(report.newest, parse_timestamp("2017-08-21 10:14:00"));
        assert_eq!(store.known_ids("#t").await.unwrap().len(), 10);

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[0].max_id, Some(114));
        assert_eq!(requests[1].max_id, Some(110));
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_second_pull_inserts_nothing() {
        let source = corpus(20);
        let store = InMemoryStore::new();
        pull_window(&source, &store, &window(), 114, &settings(4))
            .await
            .unwrap();
        let before = store.known_ids("#t").await.unwrap();

        let report = pull_window(&source, &store, &window(), 114, &settings(4))
            .await
            .unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped_known, 10);
        assert_eq!(store.known_ids("#t").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_max_records_caps_pull() {
        let source = corpus(20);
        let store = InMemoryStore::new();
        let capped = IngestSettings {
            page_size: 2,
            max_records: 3,
        };
        let report = pull_window(&source, &store, &window(), 114, &capped)
            .await
            .unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.fetched, 4);
    }

    #[tokio::test]
    async fn test_empty_source_stops_immediately() {
        let source = corpus(0);
        let store = InMemoryStore::new();
        let report = pull_window(&source, &store, &window(), 114, &settings(4))
            .await
            .unwrap();
        assert_eq!(report, IngestReport::default());
    }
}
