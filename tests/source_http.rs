//! HTTP client tests against a local fake search endpoint.
//!
//! The fake server counts requests, can answer with an error status for the
//! first N of them, and records the last query string it saw.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use peakwatch::config::SourceConfig;
use peakwatch::error::Error;
use peakwatch::source::{RecordSource, SearchClient, SearchRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const PAGE: &str = r#"{"statuses": [
    {"id": 501, "created_at": "Mon Aug 21 17:30:00 +0000 2017", "text": "totality in oregon"},
    {"id": 502, "created_at": "Mon Aug 21 17:30:05 +0000 2017", "text": "totality!!"}
]}"#;

struct Fake {
    hits: AtomicU32,
    fail_first: u32,
    fail_status: StatusCode,
    send_reset: bool,
    last_query: Mutex<HashMap<String, String>>,
    last_auth: Mutex<Option<String>>,
}

async fn search(
    State(fake): State<Arc<Fake>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, HeaderMap, String) {
    let n = fake.hits.fetch_add(1, Ordering::SeqCst) + 1;
    *fake.last_query.lock().unwrap() = params;
    *fake.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut out = HeaderMap::new();
    if n <= fake.fail_first {
        if fake.send_reset {
            let reset = chrono::Utc::now().timestamp().to_string();
            out.insert("x-rate-limit-reset", reset.parse().unwrap());
        }
        return (fake.fail_status, out, "{\"errors\": []}".to_string());
    }
    (StatusCode::OK, out, PAGE.to_string())
}

async fn spawn_fake(fail_first: u32, fail_status: StatusCode) -> (String, Arc<Fake>) {
    spawn_fake_with_reset(fail_first, fail_status, false).await
}

async fn spawn_fake_with_reset(
    fail_first: u32,
    fail_status: StatusCode,
    send_reset: bool,
) -> (String, Arc<Fake>) {
    let fake = Arc::new(Fake {
        hits: AtomicU32::new(0),
        fail_first,
        fail_status,
        send_reset,
        last_query: Mutex::new(HashMap::new()),
        last_auth: Mutex::new(None),
    });
    let app = Router::new()
        .route("/search/tweets.json", get(search))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("http://{}", addr), fake)
}

fn client(base_url: String) -> SearchClient {
    client_with_cooldown(base_url, 0)
}

fn client_with_cooldown(base_url: String, cooldown_secs: u64) -> SearchClient {
    let cfg = SourceConfig {
        base_url,
        cooldown_secs,
        timeout_secs: 5,
        ..SourceConfig::default()
    };
    SearchClient::new(&cfg, "test-token".to_string()).unwrap()
}

#[tokio::test]
async fn test_search_returns_newest_first() {
    let (url, fake) = spawn_fake(0, StatusCode::OK).await;
    let records = client(url)
        .search(&SearchRequest::new("#eclipse", 100).max_id(999))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 502);
    assert_eq!(records[0].tag, "#eclipse");

    let query = fake.last_query.lock().unwrap().clone();
    assert_eq!(query.get("q").map(String::as_str), Some("#eclipse"));
    assert_eq!(query.get("max_id").map(String::as_str), Some("999"));
    assert_eq!(query.get("lang").map(String::as_str), Some("en"));
    assert_eq!(
        fake.last_auth.lock().unwrap().as_deref(),
        Some("Bearer test-token")
    );
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let (url, fake) = spawn_fake(2, StatusCode::TOO_MANY_REQUESTS).await;
    let records = client(url)
        .search(&SearchRequest::new("#eclipse", 100))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rate_limit_reset_header_overrides_cooldown() {
    let (url, fake) = spawn_fake_with_reset(1, StatusCode::TOO_MANY_REQUESTS, true).await;
    // An hour of cool-down would time out; the reset header says "now".
    let client = client_with_cooldown(url, 3600);

    let started = Instant::now();
    let records = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        client.search(&SearchRequest::new("#eclipse", 100)),
    )
    .await
    .expect("reset header should replace the cool-down")
    .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let (url, fake) = spawn_fake(1, StatusCode::SERVICE_UNAVAILABLE).await;
    let records = client(url)
        .search(&SearchRequest::new("#eclipse", 100))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (url, fake) = spawn_fake(u32::MAX, StatusCode::UNAUTHORIZED).await;
    let err = client(url)
        .search(&SearchRequest::new("#eclipse", 100))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Source { status: 401, .. }));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}
