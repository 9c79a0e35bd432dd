//! Record source adapter.
//!
//! The [`RecordSource`] trait is the boundary to the paginated search API.
//! [`SearchClient`] implements it over HTTP against the Twitter v1.1
//! `search/tweets` shape:
//!
//! ```text
//! GET {base_url}/search/tweets.json?q=#tag&count=100&max_id=..&since=YYYY-MM-DD&until=YYYY-MM-DD
//! Authorization: Bearer <token>
//!
//! {"statuses": [{"id": 901, "created_at": "Mon Aug 21 17:30:00 +0000 2017", "text": "..."}]}
//! ```
//!
//! # Retry policy
//!
//! HTTP 429, 5xx and network errors are transient. The client sleeps and
//! repeats the same request until it succeeds; it never reports a transient
//! failure to the caller. A 429 carrying `x-rate-limit-reset` sleeps until
//! that instant, anything else sleeps for the configured cool-down
//! (180 s by default). Other 4xx statuses and malformed bodies fail fast.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::models::Record;

/// Format of `created_at` in search responses.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// One page request against the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Only records with `id <= max_id`.
    pub max_id: Option<u64>,
    /// Only records created on or after this date.
    pub since: Option<NaiveDate>,
    /// Only records created before this date.
    pub until: Option<NaiveDate>,
    pub count: u32,
}

impl SearchRequest {
    pub fn new(query: &str, count: u32) -> Self {
        Self {
            query: query.to_string(),
            max_id: None,
            since: None,
            until: None,
            count,
        }
    }

    pub fn max_id(mut self, max_id: u64) -> Self {
        self.max_id = Some(max_id);
        self
    }

    pub fn since(mut self, since: NaiveDate) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }
}

/// A paginated, id-ordered search source.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Return matching records, newest (highest id) first.
    ///
    /// An empty vector means there is nothing older than `max_id` that
    /// matches. Implementations absorb rate limiting and transient failures.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Record>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: u64,
    created_at: String,
    #[serde(alias = "full_text")]
    text: String,
}

/// HTTP client for the search API.
///
/// Built once by the entry point and shared by reference.
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    lang: Option<String>,
    cooldown: Duration,
}

impl SearchClient {
    pub fn new(config: &SourceConfig, token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Source {
                status: 0,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            lang: config.lang.clone().filter(|l| !l.is_empty()),
            cooldown: Duration::from_secs(config.cooldown_secs),
        })
    }

    /// Build a client reading the bearer token from `config.token_env`.
    pub fn from_env(config: &SourceConfig) -> anyhow::Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow::anyhow!("{} not set", config.token_env))?;
        Ok(Self::new(config, token)?)
    }

    fn query_params(&self, request: &SearchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", request.query.clone()),
            ("count", request.count.min(100).to_string()),
            ("result_type", "recent".to_string()),
        ];
        if let Some(max_id) = request.max_id {
            params.push(("max_id", max_id.to_string()));
        }
        if let Some(since) = request.since {
            params.push(("since", since.format("%Y-%m-%d").to_string()));
        }
        if let Some(until) = request.until {
            params.push(("until", until.format("%Y-%m-%d").to_string()));
        }
        if let Some(lang) = &self.lang {
            params.push(("lang", lang.clone()));
        }
        params
    }

    /// One attempt. Returns `(result, retry_after)` where `retry_after`
    /// overrides the cool-down for throttled responses.
    async fn attempt(&self, request: &SearchRequest) -> (Result<Vec<Record>>, Option<Duration>) {
        let url = format!("{}/search/tweets.json", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&self.query_params(request))
            .send()
            .await;

        let response = match resp {
            Ok(r) => r,
            Err(e) => return (Err(Error::TransientSource(e.to_string())), None),
        };

        let status = response.status();
        if status.is_success() {
            let body = match response.text().await {
                Ok(b) => b,
                Err(e) => return (Err(Error::TransientSource(e.to_string())), None),
            };
            return (parse_search_response(&body, &request.query), None);
        }

        if status.as_u16() == 429 {
            let wait = response
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .map(|reset| reset_wait(reset, Utc::now()));
            let body = response.text().await.unwrap_or_default();
            return (
                Err(Error::TransientSource(format!("rate limited: {}", body))),
                wait,
            );
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return (
                Err(Error::TransientSource(format!("{}: {}", status, body))),
                None,
            );
        }

        (
            Err(Error::Source {
                status: status.as_u16(),
                message: body,
            }),
            None,
        )
    }
}

#[async_trait]
impl RecordSource for SearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Record>> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.attempt(request).await {
                (Ok(records), _) => {
                    debug!(
                        query = %request.query,
                        max_id = ?request.max_id,
                        returned = records.len(),
                        "search page"
                    );
                    return Ok(records);
                }
                (Err(Error::TransientSource(msg)), retry_after) => {
                    let wait = retry_after.unwrap_or(self.cooldown);
                    warn!(
                        attempt,
                        wait_secs = wait.as_secs(),
                        error = %msg,
                        "source unavailable, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                (Err(e), _) => return Err(e),
            }
        }
    }
}

/// Time to sleep until the epoch-seconds `reset`, plus one second of slack.
fn reset_wait(reset: i64, now: DateTime<Utc>) -> Duration {
    let secs = (reset - now.timestamp()).max(0) + 1;
    Duration::from_secs(secs as u64)
}

/// Parse a search response body into records tagged with `tag`, newest first.
pub fn parse_search_response(body: &str, tag: &str) -> Result<Vec<Record>> {
    let parsed: SearchResponse = serde_json::from_str(body)?;

    let mut records = parsed
        .statuses
        .into_iter()
        .map(|s| {
            let timestamp = DateTime::parse_from_str(&s.created_at, CREATED_AT_FORMAT)
                .map_err(|e| Error::Parse(format!("bad created_at '{}': {}", s.created_at, e)))?
                .with_timezone(&Utc);
            Ok(Record {
                id: s.id,
                tag: tag.to_string(),
                timestamp,
                text: s.text,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    records.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_search_response() {
        let body = r##"{"statuses": [
            {"id": 10, "created_at": "Mon Aug 21 17:30:00 +0000 2017", "text": "first"},
            {"id": 12, "created_at": "Mon Aug 21 17:31:15 +0000 2017", "text": "second"}
        ]}"##;
        let records = parse_search_response(body, "#eclipse").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 12);
        assert_eq!(records[0].tag, "#eclipse");
        assert_eq!(
            records[1].timestamp,
            Utc.with_ymd_and_hms(2017, 8, 21, 17, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_search_response(r#"{"statuses": []}"#, "#x")
            .unwrap()
            .is_empty());
        assert!(parse_search_response("{}", "#x").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        let body = r#"{"statuses": [{"id": 1, "created_at": "yesterday", "text": "x"}]}"#;
        assert!(matches!(
            parse_search_response(body, "#x"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_reset_wait() {
        let now = Utc.with_ymd_and_hms(2017, 8, 21, 17, 30, 0).unwrap();
        assert_eq!(reset_wait(now.timestamp() + 30, now), Duration::from_secs(31));
        assert_eq!(reset_wait(now.timestamp() - 30, now), Duration::from_secs(1));
    }

    #[test]
    fn test_query_params() {
        let client = SearchClient::new(&SourceConfig::default(), "t".to_string()).unwrap();
        let req = SearchRequest::new("#eclipse", 100)
            .max_id(99)
            .since(NaiveDate::from_ymd_opt(2017, 8, 21).unwrap())
            .until(NaiveDate::from_ymd_opt(2017, 8, 22).unwrap());
        let params = client.query_params(&req);
        assert!(params.contains(&("max_id", "99".to_string())));
        assert!(params.contains(&("since", "2017-08-21".to_string())));
        assert!(params.contains(&("until", "2017-08-22".to_string())));
        assert!(params.contains(&("lang", "en".to_string())));
    }
}
