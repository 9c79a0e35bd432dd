//! SQLite-backed [`RecordStore`].
//!
//! Records live in the append-only `tweets` table (surrogate `id`, then
//! `tweet_id`, `tag`, `datetime`, `content`). There is no unique constraint on
//! `(tag, tweet_id)`; dedup happens in the insert statement itself, which only
//! writes when no row for the pair exists. SQLite runs the check and the write
//! as one statement, so two concurrent pulls cannot both insert the same id.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{format_timestamp, IngestReport, IngestionWindow, Record, DATETIME_FORMAT};

use super::{RecordStore, TagStats};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_db_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| Error::Storage(format!("record id {} exceeds INTEGER range", id)))
}

fn parse_db_datetime(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| Error::Storage(format!("bad stored datetime '{}': {}", s, e)))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn ensure_schema(&self, tag: &str) -> Result<()> {
        debug!(tag, "ensuring schema");
        migrate::run_migrations(&self.pool).await
    }

    async fn known_ids(&self, tag: &str) -> Result<HashSet<u64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT tweet_id FROM tweets WHERE tag = ?")
            .bind(tag)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|id| id as u64).collect())
    }

    async fn insert(&self, record: &Record) -> Result<bool> {
        let tweet_id = to_db_id(record.id)?;
        let result = sqlx::query(
            r#"
            INSERT INTO tweets (tweet_id, tag, datetime, content)
            SELECT ?, ?, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM tweets WHERE tag = ? AND tweet_id = ?)
            "#,
        )
        .bind(tweet_id)
        .bind(&record.tag)
        .bind(format_timestamp(record.timestamp))
        .bind(&record.text)
        .bind(&record.tag)
        .bind(tweet_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn read_window(
        &self,
        tag: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT tweet_id, tag, datetime, content
            FROM tweets
            WHERE tag = ? AND datetime >= ? AND datetime <= ?
            ORDER BY id
            "#,
        )
        .bind(tag)
        .bind(format_timestamp(start))
        .bind(format_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let datetime: String = row.get("datetime");
                Ok(Record {
                    id: row.get::<i64, _>("tweet_id") as u64,
                    tag: row.get("tag"),
                    timestamp: parse_db_datetime(&datetime)?,
                    text: row.get("content"),
                })
            })
            .collect()
    }

    async fn window_covered(&self, window: &IngestionWindow) -> Result<bool> {
        let covered: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM pulls WHERE tag = ? AND start_at <= ? AND end_at >= ?",
        )
        .bind(&window.tag)
        .bind(format_timestamp(window.start))
        .bind(format_timestamp(window.end))
        .fetch_one(&self.pool)
        .await?;
        Ok(covered)
    }

    async fn record_pull(&self, window: &IngestionWindow, report: &IngestReport) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO pulls (id, tag, start_at, end_at, fetched, inserted, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&window.tag)
        .bind(format_timestamp(window.start))
        .bind(format_timestamp(window.end))
        .bind(report.fetched as i64)
        .bind(report.inserted as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn tag_stats(&self) -> Result<Vec<TagStats>> {
        let rows = sqlx::query(
            r#"
            SELECT
                t.tag AS tag,
                COUNT(*) AS records,
                MIN(t.datetime) AS first,
                MAX(t.datetime) AS last,
                (SELECT COUNT(*) FROM pulls p WHERE p.tag = t.tag) AS pulls
            FROM tweets t
            GROUP BY t.tag
            ORDER BY records DESC, t.tag
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let first: Option<String> = row.get("first");
                let last: Option<String> = row.get("last");
                Ok(TagStats {
                    tag: row.get("tag"),
                    records: row.get::<i64, _>("records") as u64,
                    first: first.as_deref().map(parse_db_datetime).transpose()?,
                    last: last.as_deref().map(parse_db_datetime).transpose()?,
                    pulls: row.get::<i64, _>("pulls") as u64,
                })
            })
            .collect()
    }
}
