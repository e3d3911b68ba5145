//! Upstream market-data API client
//!
//! `MarketDataApi` is the seam the worker loop depends on; `TdaClient` is
//! the production implementation. Every response - success, 4xx, 5xx - is
//! recorded in the audit store before the outcome is surfaced, so the
//! latest upstream exchange per (symbol, job) is always inspectable.

pub mod types;

use crate::db::{EtlDb, RawResponse};
use crate::error::{AppError, Result};
use crate::jobs::{Endpoint, JobType, WorkItem};
use crate::token::TokenProvider;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a successful call: the decoded payload plus the item it
/// belongs to, handed to the transform stage.
#[derive(Debug, Clone)]
pub struct ApiSuccess {
    pub body: Value,
    pub item: WorkItem,
}

/// The single-flight caller the worker loop drives.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Fetch the raw payload for one work item.
    async fn call(&self, item: &WorkItem) -> Result<ApiSuccess>;
}

/// Rate-limit-aware client for the upstream market-data API.
pub struct TdaClient {
    client: Client,
    db: Arc<EtlDb>,
    token: Arc<TokenProvider>,
    api_key: String,
    base_url: String,
    retry_max: u32,
    retry_wait: Duration,
}

impl TdaClient {
    pub fn new(
        db: Arc<EtlDb>,
        token: Arc<TokenProvider>,
        api_key: String,
        base_url: String,
        retry_max: u32,
        retry_wait: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            db,
            token,
            api_key,
            base_url,
            retry_max,
            retry_wait,
        })
    }

    /// Execute the request, retrying transport failures up to the bound.
    /// HTTP error statuses come back as responses, never as retries.
    async fn send_with_retry(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let bearer = self.token.fetch()?;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .client
                .get(url)
                .bearer_auth(&bearer)
                .query(query)
                .send()
                .await;
            match result {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let err = AppError::Transport(e);
                    if !err.is_retryable() || attempt >= self.retry_max {
                        return Err(err);
                    }
                    tracing::warn!(
                        "transport failure (attempt {}/{}): {}",
                        attempt,
                        self.retry_max,
                        err
                    );
                    tokio::time::sleep(self.retry_wait).await;
                }
            }
        }
    }
}

#[async_trait]
impl MarketDataApi for TdaClient {
    async fn call(&self, item: &WorkItem) -> Result<ApiSuccess> {
        let (url, mut query) = request_parts(&self.base_url, item, Utc::now());
        query.push(("apikey", self.api_key.clone()));

        let resp = self.send_with_retry(&url, &query).await?;
        let status = resp.status().as_u16();
        let request = format!("GET {}", resp.url());
        let text = resp.text().await?;

        // A malformed body is still worth auditing; record what came back
        // verbatim before failing the decode.
        let (body, decode_err) = match serde_json::from_str::<Value>(&text) {
            Ok(v) => (v, None),
            Err(e) => (Value::String(text), Some(e)),
        };
        self.db.record_response(
            item,
            &RawResponse {
                status,
                body: body.clone(),
                request,
            },
        )?;

        if status >= 400 {
            return Err(AppError::HttpStatus {
                status,
                symbol: item.symbol.clone(),
            });
        }
        if let Some(e) = decode_err {
            return Err(AppError::Decode(format!(
                "{} {}: malformed payload: {}",
                item.symbol, item.job, e
            )));
        }

        Ok(ApiSuccess {
            body,
            item: item.clone(),
        })
    }
}

/// Build the endpoint URL and job-specific query parameters for one item.
/// Auth (bearer header, apikey) is attached by the caller.
fn request_parts(
    base_url: &str,
    item: &WorkItem,
    now: chrono::DateTime<Utc>,
) -> (String, Vec<(&'static str, String)>) {
    let spec = item.job.spec();
    match spec.endpoint {
        Endpoint::Instruments => (
            format!("{}/instruments", base_url),
            vec![
                ("projection", "fundamental".to_string()),
                ("symbol", item.symbol.clone()),
            ],
        ),
        Endpoint::PriceHistory => {
            let window = spec
                .window
                .expect("price-history jobs always carry a window");
            let (start, end) = window.resolve(now);
            (
                format!("{}/marketdata/{}/pricehistory", base_url, item.symbol),
                vec![
                    ("periodType", "day".to_string()),
                    ("frequencyType", "minute".to_string()),
                    ("frequency", window.frequency_minutes.to_string()),
                    ("startDate", start.to_string()),
                    ("endDate", end.to_string()),
                    ("needExtendedHoursData", "true".to_string()),
                ],
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn query_value<'a>(query: &'a [(&'static str, String)], key: &str) -> &'a str {
        &query.iter().find(|(k, _)| *k == key).unwrap().1
    }

    #[test]
    fn test_fundamentals_request_parts() {
        let item = WorkItem::new("TSLA", JobType::Fundamentals);
        let (url, query) = request_parts("https://api.example.com/v1", &item, Utc::now());

        assert_eq!(url, "https://api.example.com/v1/instruments");
        assert_eq!(query_value(&query, "projection"), "fundamental");
        assert_eq!(query_value(&query, "symbol"), "TSLA");
    }

    #[test]
    fn test_medium_trend_request_parts() {
        let item = WorkItem::new("MSFT", JobType::MediumTrend);
        let now = Utc.with_ymd_and_hms(2023, 3, 10, 14, 30, 0).unwrap();
        let (url, query) = request_parts("https://api.example.com/v1", &item, now);

        assert_eq!(url, "https://api.example.com/v1/marketdata/MSFT/pricehistory");
        assert_eq!(query_value(&query, "periodType"), "day");
        assert_eq!(query_value(&query, "frequencyType"), "minute");
        assert_eq!(query_value(&query, "frequency"), "30");
        assert_eq!(query_value(&query, "needExtendedHoursData"), "true");

        let start: i64 = query_value(&query, "startDate").parse().unwrap();
        let end: i64 = query_value(&query, "endDate").parse().unwrap();
        assert_eq!(end - start, 15 * 24 * 3600 * 1000);
    }

    #[test]
    fn test_signals_request_uses_fifteen_minute_bars() {
        let item = WorkItem::new("NVDA", JobType::Signals);
        let now = Utc.with_ymd_and_hms(2023, 3, 10, 9, 0, 0).unwrap();
        let (_, query) = request_parts("https://api.example.com/v1", &item, now);

        assert_eq!(query_value(&query, "frequency"), "15");
        let start: i64 = query_value(&query, "startDate").parse().unwrap();
        let end: i64 = query_value(&query, "endDate").parse().unwrap();
        assert_eq!(end - start, 14 * 3600 * 1000);
    }

    /// Serve a fixed HTTP response for every connection, counting hits.
    async fn serve_fixed(
        status_line: &'static str,
        body: &'static str,
        hits: Arc<AtomicUsize>,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    /// Accept connections and drop them unanswered, counting attempts.
    async fn serve_dropping(hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });
        format!("http://{}", addr)
    }

    fn test_client(
        db: &Arc<EtlDb>,
        base_url: String,
        retry_max: u32,
    ) -> (TdaClient, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            json!({
                "headers": { "date": Utc::now().to_rfc2822() },
                "data": { "access_token": "test-token", "expires_in": 3600 }
            })
            .to_string(),
        )
        .unwrap();
        let token = Arc::new(TokenProvider::new(file.path()).unwrap());
        let client = TdaClient::new(
            Arc::clone(db),
            token,
            "test-key".to_string(),
            base_url,
            retry_max,
            Duration::from_millis(0),
        )
        .unwrap();
        (client, file)
    }

    #[tokio::test]
    async fn test_http_error_is_audited_and_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_fixed(
            "404 Not Found",
            r#"{"error":"Not Found"}"#,
            Arc::clone(&hits),
        )
        .await;

        let db = Arc::new(EtlDb::in_memory().unwrap());
        let (client, _cred) = test_client(&db, base, 4);
        let item = WorkItem::new("TSLA", JobType::Fundamentals);

        let err = client.call(&item).await.unwrap_err();
        assert!(matches!(err, AppError::HttpStatus { status: 404, .. }));
        // An HTTP error status is a response, never a retry.
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let recorded = db.response_for(&item).unwrap().unwrap();
        assert_eq!(recorded.status, 404);
        assert_eq!(recorded.body, json!({"error": "Not Found"}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_audited_verbatim() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_fixed("200 OK", "not json", Arc::clone(&hits)).await;

        let db = Arc::new(EtlDb::in_memory().unwrap());
        let (client, _cred) = test_client(&db, base, 4);
        let item = WorkItem::new("MSFT", JobType::Fundamentals);

        let err = client.call(&item).await.unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let recorded = db.response_for(&item).unwrap().unwrap();
        assert_eq!(recorded.status, 200);
        assert_eq!(recorded.body, json!("not json"));
    }

    #[tokio::test]
    async fn test_transport_failure_retried_to_the_bound() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_dropping(Arc::clone(&hits)).await;

        let db = Arc::new(EtlDb::in_memory().unwrap());
        let (client, _cred) = test_client(&db, base, 3);
        let item = WorkItem::new("NVDA", JobType::Fundamentals);

        let err = client.call(&item).await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        // Nothing to audit: no response ever arrived.
        assert!(db.response_for(&item).unwrap().is_none());
    }
}
