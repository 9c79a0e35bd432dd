//! Id-range resolution.
//!
//! The source can only page backwards from an id ("N records older than X"),
//! never by time range. To start a pull at the end of a window we need the
//! id that corresponds to `end`, so we bisect the id space with probes:
//!
//! 1. Upper bracket: newest record before `end + 1 day`.
//! 2. Lower bracket: newest record before `start`'s date (or id 0 when the
//!    source keeps nothing that old).
//! 3. Probe the midpoint id with a small batch and keep the newest record.
//!    A probe newer than `end` becomes the new upper bracket; anything else
//!    moves the lower bracket up to the midpoint.
//! 4. Stop when the upper bracket is within `tolerance` of `end`, or when
//!    no id is left between the brackets.
//!
//! Because every probe after `end` replaces the upper bracket, the returned
//! id is never older than the window's last record.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::models::{IngestionWindow, Record};
use crate::source::{RecordSource, SearchRequest};

/// Tuning for [`resolve_max_id`].
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub probe_batch: u32,
    pub tolerance: Duration,
    pub max_iterations: u32,
}

impl From<&ResolverConfig> for ResolverSettings {
    fn from(cfg: &ResolverConfig) -> Self {
        Self {
            probe_batch: cfg.probe_batch,
            tolerance: Duration::seconds(cfg.tolerance_secs),
            max_iterations: cfg.max_iterations,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

/// Find the id to start paging from so that the first page covers `window.end`.
///
/// Returns `None` when the source has no matching record before
/// `end + 1 day` at all.
pub async fn resolve_max_id(
    source: &dyn RecordSource,
    window: &IngestionWindow,
    settings: &ResolverSettings,
) -> Result<Option<u64>> {
    let query = window.tag.as_str();

    let Some(mut high) = newest(
        source,
        &SearchRequest::new(query, 1).until(window.until_date()),
    )
    .await?
    else {
        info!(tag = %query, "source has no records before window end");
        return Ok(None);
    };

    let mut low = newest(
        source,
        &SearchRequest::new(query, 1).until(window.since_date()),
    )
    .await?
    .map(|r| r.id)
    .unwrap_or(0);

    let mut iterations: u32 = 0;
    while !within_tolerance(&high, window.end, settings.tolerance) {
        if high.id <= low.saturating_add(1) {
            debug!(high = high.id, low, "bracket collapsed");
            break;
        }
        iterations += 1;
        if iterations > settings.max_iterations {
            return Err(Error::ResolutionTimeout {
                iterations: settings.max_iterations,
            });
        }

        let mid = low + (high.id - low) / 2;
        let probe = newest(
            source,
            &SearchRequest::new(query, settings.probe_batch).max_id(mid),
        )
        .await?;

        match probe {
            Some(p) if p.timestamp > window.end => {
                debug!(iteration = iterations, id = p.id, at = %p.timestamp, "probe after end");
                high = p;
            }
            _ => {
                // Nothing in (mid, high) is older than the probe, so every id
                // up to mid is at or before end.
                debug!(iteration = iterations, mid, "probe at or before end");
                low = mid;
            }
        }
    }

    info!(
        tag = %query,
        max_id = high.id,
        at = %high.timestamp,
        iterations,
        "resolved window end"
    );
    Ok(Some(high.id))
}

fn within_tolerance(high: &Record, end: DateTime<Utc>, tolerance: Duration) -> bool {
    high.timestamp - end <= tolerance
}

async fn newest(source: &dyn RecordSource, request: &SearchRequest) -> Result<Option<Record>> {
    Ok(source.search(request).await?.into_iter().max_by_key(|r| r.id))
}
