//! Fixed-interval time bucketing.
//!
//! Records are grouped by `floor((ts - first_ts) / interval)` and the result
//! is densified: every index from 0 to the largest one present gets a bucket,
//! empty ones with a zero count and no texts.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::models::{Bucket, BucketSeries, Record};

/// Bucket `records` into a dense series of `interval`-wide slices.
///
/// The series starts at the earliest record timestamp. Texts keep the order
/// the records were given in. `interval` must be at least one second.
pub fn bucket(records: &[Record], interval: Duration) -> Result<BucketSeries> {
    let start = records
        .iter()
        .map(|r| r.timestamp)
        .min()
        .ok_or(Error::EmptyInput)?;
    let interval_secs = interval.num_seconds().max(1);

    let indexed: Vec<(usize, &Record)> = records
        .iter()
        .map(|r| (bucket_index(start, r.timestamp, interval_secs), r))
        .collect();
    let max_index = indexed.iter().map(|(i, _)| *i).max().unwrap_or(0);

    let mut buckets: Vec<Bucket> = (0..=max_index)
        .map(|index| Bucket {
            index,
            start: start + Duration::seconds(index as i64 * interval_secs),
            count: 0,
            texts: Vec::new(),
        })
        .collect();

    for (index, record) in indexed {
        let b = &mut buckets[index];
        b.count += 1;
        b.texts.push(record.text.clone());
    }

    Ok(BucketSeries {
        start,
        interval_secs,
        buckets,
    })
}

fn bucket_index(start: DateTime<Utc>, ts: DateTime<Utc>, interval_secs: i64) -> usize {
    // ts >= start, so the quotient is non-negative and floor == truncation
    ((ts - start).num_seconds() / interval_secs) as usize
}
