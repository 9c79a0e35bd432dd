use sqlx::SqlitePool;

use crate::error::Result;

/// Create the record and pull-log tables. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Append-only record table; uniqueness of (tag, tweet_id) is enforced by
    // the insert statement, not by a constraint.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tweets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tweet_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            datetime TEXT NOT NULL,
            content TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Completed ingestion pulls, one row per (tag, window) run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pulls (
            id TEXT PRIMARY KEY,
            tag TEXT NOT NULL,
            start_at TEXT NOT NULL,
            end_at TEXT NOT NULL,
            fetched INTEGER NOT NULL,
            inserted INTEGER NOT NULL,
            completed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tweets_tag_tweet_id ON tweets(tag, tweet_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tweets_tag_datetime ON tweets(tag, datetime)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pulls_tag ON pulls(tag)")
        .execute(pool)
        .await?;

    Ok(())
}
