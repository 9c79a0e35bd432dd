//! End-to-end analysis run.
//!
//! ```text
//! resolve id ──▶ pull into store ──▶ read window ──▶ bucket
//!                                                      │
//!        keywords ◀── segment ◀── detect peaks ◀───────┘
//! ```
//!
//! [`Pipeline::run`] is the single entry point. Runs for the same tag are
//! serialized by a per-tag lock held for the whole run, so dedup checks and
//! inserts from two requests never interleave inside one process.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bucket::bucket;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{pull_window, IngestSettings};
use crate::keywords::label_peak;
use crate::models::{AnalysisResult, IngestReport, IngestionWindow, Peak};
use crate::peakdet::{detect_peaks, threshold};
use crate::resolve::{resolve_max_id, ResolverSettings};
use crate::segment::{aggregate_texts, segment};
use crate::source::RecordSource;
use crate::store::RecordStore;

/// Analysis parameters.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub interval: Duration,
    pub peak_ratio: f64,
    pub keyword_window: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            interval: Duration::minutes(1),
            peak_ratio: 0.25,
            keyword_window: 2,
        }
    }
}

/// How a run treats the record source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Pull unless a completed pull already covers the window.
    #[default]
    IfMissing,
    /// Pull even when the window was pulled before.
    Always,
    /// Use stored records only.
    Never,
}

#[derive(Default)]
struct TagLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TagLocks {
    fn get(&self, tag: &str) -> Arc<tokio::sync::Mutex<()>> {
        // Only handles live here; a poisoned map is still usable.
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(tag.to_string()).or_default().clone()
    }
}

pub struct Pipeline {
    source: Option<Arc<dyn RecordSource>>,
    store: Arc<dyn RecordStore>,
    resolver: ResolverSettings,
    ingest: IngestSettings,
    analysis: AnalysisSettings,
    locks: TagLocks,
}

impl Pipeline {
    /// A pipeline that reads from `store` only. Attach a source with
    /// [`with_source`](Pipeline::with_source) to pull new records.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            source: None,
            store,
            resolver: ResolverSettings::default(),
            ingest: IngestSettings::default(),
            analysis: AnalysisSettings::default(),
            locks: TagLocks::default(),
        }
    }

    pub fn from_config(store: Arc<dyn RecordStore>, config: &Config) -> Self {
        Self::new(store)
            .with_resolver(ResolverSettings::from(&config.resolver))
            .with_ingest(IngestSettings::from(&config.source))
            .with_analysis(AnalysisSettings {
                interval: Duration::seconds(config.analysis.interval_secs),
                peak_ratio: config.analysis.peak_ratio,
                keyword_window: config.analysis.keyword_window,
            })
    }

    pub fn with_source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverSettings) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_ingest(mut self, ingest: IngestSettings) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisSettings) -> Self {
        self.analysis = analysis;
        self
    }

    /// Analyze `tag` over `[start, end]`, pulling records when needed.
    pub async fn run(
        &self,
        tag: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AnalysisResult> {
        self.run_with(tag, start, end, FetchMode::IfMissing).await
    }

    pub async fn run_with(
        &self,
        tag: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mode: FetchMode,
    ) -> Result<AnalysisResult> {
        let window = IngestionWindow::new(tag, start, end)?;
        let lock = self.locks.get(&window.tag);
        let _guard = lock.lock().await;

        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, tag = %window.tag, start = %window.start, end = %window.end, "analysis started");

        self.store.ensure_schema(&window.tag).await?;
        let ingest = self.sync_locked(&window, mode).await?;

        let records = self
            .store
            .read_window(&window.tag, window.start, window.end)
            .await?;
        let series = bucket(&records, self.analysis.interval)?;
        let counts = series.counts();

        let delta = threshold(&counts, self.analysis.peak_ratio);
        let detected = detect_peaks(&counts, delta);
        let locations: Vec<usize> = detected.iter().map(|p| p.position).collect();
        let segmentation = segment(&counts, &locations);

        let peaks: Vec<Peak> = detected
            .iter()
            .zip(segmentation.members)
            .map(|(p, members)| {
                let texts = aggregate_texts(&series.buckets, &members);
                let keyword = match label_peak(&texts, &window.tag, self.analysis.keyword_window) {
                    Ok(k) => Some(k),
                    Err(e) => {
                        warn!(location = p.position, error = %e, "peak left unlabeled");
                        None
                    }
                };
                Peak {
                    location: p.position,
                    magnitude: counts[p.position],
                    time: series.buckets[p.position].start,
                    member_buckets: members,
                    aggregated_text: texts,
                    keyword,
                }
            })
            .collect();

        info!(
            run_id = %run_id,
            records = records.len(),
            buckets = series.len(),
            peaks = peaks.len(),
            "analysis finished"
        );

        Ok(AnalysisResult {
            run_id,
            window,
            ingest,
            series,
            peaks,
            background: segmentation.background,
        })
    }

    /// Pull `[start, end]` for `tag` into the store without analyzing it.
    pub async fn sync(
        &self,
        tag: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mode: FetchMode,
    ) -> Result<Option<IngestReport>> {
        let window = IngestionWindow::new(tag, start, end)?;
        let lock = self.locks.get(&window.tag);
        let _guard = lock.lock().await;
        self.store.ensure_schema(&window.tag).await?;
        self.sync_locked(&window, mode).await
    }

    async fn sync_locked(
        &self,
        window: &IngestionWindow,
        mode: FetchMode,
    ) -> Result<Option<IngestReport>> {
        let Some(source) = self.source.as_deref() else {
            return Ok(None);
        };
        match mode {
            FetchMode::Never => return Ok(None),
            FetchMode::IfMissing if self.store.window_covered(window).await? => {
                info!(tag = %window.tag, "window already pulled, skipping source");
                return Ok(None);
            }
            _ => {}
        }

        let Some(max_id) = resolve_max_id(source, window, &self.resolver).await? else {
            return Ok(Some(IngestReport::default()));
        };
        let report = pull_window(source, self.store.as_ref(), window, max_id, &self.ingest).await?;

        match settled_range(window, &report, Utc::now()) {
            Some(settled) => {
                self.store.record_pull(&settled, &report).await?;
            }
            None => debug!(tag = %window.tag, "window still open, pull not logged"),
        }
        Ok(Some(report))
    }
}

/// The part of `window` a finished pull has settled, if any.
///
/// The source only counts as done with a range it has moved past: up to
/// `window.end` when the pull saw a record newer than that, otherwise up to
/// the newest record seen. A window that reaches past `now` settles nothing.
fn settled_range(
    window: &IngestionWindow,
    report: &IngestReport,
    now: DateTime<Utc>,
) -> Option<IngestionWindow> {
    if window.end > now {
        return None;
    }
    let end = report.newest?.min(window.end);
    if end < window.start {
        return None;
    }
    Some(IngestionWindow {
        tag: window.tag.clone(),
        start: window.start,
        end,
    })
}

/// Map a run error to the reason shown to the user.
pub fn failure_reason(err: &Error) -> String {
    match err {
        Error::EmptyInput => "no data for window".to_string(),
        other => other.to_string(),
    }
}
