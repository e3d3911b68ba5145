//! Worker loop / scheduler
//!
//! One run drains the queue: claim -> call -> transform -> load. The API
//! call phase is strictly sequential (the upstream enforces a per-minute
//! request cap) with a fixed throttle sleep between calls; transform and
//! load run as concurrent tasks behind a bounded semaphore and are joined
//! only once the queue is drained. Per-item failures are logged and
//! dead-lettered without aborting the batch; queue-store failures abort
//! the run.

use crate::api::{ApiSuccess, MarketDataApi};
use crate::db::EtlDb;
use crate::error::{AppError, Result};
use crate::jobs::WorkItem;
use crate::transform::transform;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Worker tunables, usually sourced from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Fixed delay between successive upstream calls.
    pub throttle: Duration,
    /// Concurrency cap for transform/load tasks.
    pub transform_concurrency: usize,
    /// Worker lease time-to-live.
    pub lease_ttl: Duration,
}

impl From<&crate::config::Config> for WorkerConfig {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            throttle: cfg.throttle,
            transform_concurrency: cfg.transform_concurrency,
            lease_ttl: cfg.lease_ttl,
        }
    }
}

/// Counters for one completed run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Items claimed from the queue.
    pub claimed: usize,
    /// Items whose document reached the result store.
    pub succeeded: usize,
    /// Items dead-lettered (call, transform, or load failure).
    pub failed: usize,
}

/// The single-instance worker driving the ETL pipeline.
pub struct Worker {
    db: Arc<EtlDb>,
    api: Arc<dyn MarketDataApi>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(db: Arc<EtlDb>, api: Arc<dyn MarketDataApi>, config: WorkerConfig) -> Self {
        Self { db, api, config }
    }

    /// Run one full drain of the queue.
    ///
    /// Fails fast with `AlreadyWorking` when another run holds the lease;
    /// the lease is released on every exit path of a started run.
    pub async fn run(&self) -> Result<RunSummary> {
        let owner = self.db.acquire_lease(self.config.lease_ttl)?;
        tracing::info!("Worker run started");

        let outcome = self.drain().await;

        if let Err(e) = self.db.release_lease(owner) {
            tracing::error!("Failed to release worker lease: {}", e);
        }
        match &outcome {
            Ok(summary) => tracing::info!(
                "Worker run finished: {} claimed, {} succeeded, {} failed",
                summary.claimed,
                summary.succeeded,
                summary.failed
            ),
            Err(e) => tracing::error!("Worker run aborted: {}", e),
        }
        outcome
    }

    async fn drain(&self) -> Result<RunSummary> {
        // Recover items left in-transform by a crashed run.
        let reset = self.db.reset_all_to_pending()?;
        if reset > 0 {
            tracing::debug!("Reset {} queue items to pending", reset);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.transform_concurrency));
        let mut tasks: JoinSet<bool> = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            // None is the sole termination signal.
            let Some(item) = self.db.claim_one()? else {
                break;
            };
            summary.claimed += 1;

            match self.api.call(&item).await {
                Ok(success) => {
                    // Flip the stage before transform is in flight so a
                    // crash mid-transform does not re-hit the upstream on
                    // a restart that skips the pending reset.
                    self.db.advance_stage(&item)?;

                    let db = Arc::clone(&self.db);
                    let semaphore = Arc::clone(&semaphore);
                    tasks.spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .expect("semaphore is never closed");
                        transform_load(&db, success)
                    });
                }
                Err(e) => {
                    self.log_failure(&item, &e, "api-call");
                    self.db.move_to_dead_letter(&item, &e.to_string())?;
                    summary.failed += 1;
                }
            }

            tokio::time::sleep(self.config.throttle).await;
        }

        // Drain: wait for every in-flight transform/load task.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    tracing::error!("Transform task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    fn log_failure(&self, item: &WorkItem, error: &AppError, category: &str) {
        tracing::warn!("{} {} failed ({}): {}", item.symbol, item.job, category, error);
        if let Err(log_err) = self.db.log_event(
            &format!("{} {}: {}", item.symbol, item.job, error),
            category,
        ) {
            tracing::error!("Failed to write run log: {}", log_err);
        }
    }
}

/// Transform the raw payload and load the document, then settle the queue
/// entry: removed on success, dead-lettered on failure. Store errors in
/// here are logged, not propagated - the task has no caller to abort.
fn transform_load(db: &EtlDb, success: ApiSuccess) -> bool {
    let item = success.item;
    let result = transform(item.job, &item.symbol, &success.body)
        .and_then(|doc| db.upsert_document(item.job.spec().result_table, &item.symbol, &doc));

    match result {
        Ok(()) => {
            if let Err(e) = db.remove(&item) {
                tracing::error!("Failed to remove finished item {}: {}", item.symbol, e);
                return false;
            }
            true
        }
        Err(e) => {
            tracing::warn!("{} {} transform-load failed: {}", item.symbol, item.job, e);
            if let Err(log_err) =
                db.log_event(&format!("{} {}: {}", item.symbol, item.job, e), "transform-load")
            {
                tracing::error!("Failed to write run log: {}", log_err);
            }
            if let Err(dl_err) = db.move_to_dead_letter(&item, &e.to_string()) {
                tracing::error!("Failed to dead-letter {}: {}", item.symbol, dl_err);
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobType;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub upstream: fixed payload per job type, optional failing symbols.
    struct StubApi {
        calls: AtomicUsize,
        failing: HashSet<String>,
    }

    impl StubApi {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: HashSet::new(),
            }
        }

        fn failing(symbols: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: symbols.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn payload_for(item: &WorkItem) -> Value {
            match item.job {
                JobType::Fundamentals => {
                    // Instruments payloads nest the document under the symbol key.
                    let inner = json!({
                        "symbol": item.symbol,
                        "cusip": "000000000",
                        "exchange": "NYSE",
                        "description": "stub",
                        "fundamental": {
                            "symbol": item.symbol,
                            "marketCap": 750.123,
                            "peRatio": 10.016
                        }
                    });
                    let mut map = serde_json::Map::new();
                    map.insert(item.symbol.clone(), inner);
                    Value::Object(map)
                }
                _ => json!({
                    "symbol": item.symbol,
                    "candles": [
                        { "datetime": 1, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 10 },
                        { "datetime": 2, "open": 2.0, "high": 2.0, "low": 2.0, "close": 2.0, "volume": 20 },
                        { "datetime": 3, "open": 3.0, "high": 3.0, "low": 3.0, "close": 3.0, "volume": 30 }
                    ]
                }),
            }
        }
    }

    #[async_trait]
    impl MarketDataApi for StubApi {
        async fn call(&self, item: &WorkItem) -> Result<ApiSuccess> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&item.symbol) {
                return Err(AppError::HttpStatus {
                    status: 404,
                    symbol: item.symbol.clone(),
                });
            }
            Ok(ApiSuccess {
                body: Self::payload_for(item),
                item: item.clone(),
            })
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            throttle: Duration::from_millis(0),
            transform_concurrency: 4,
            lease_ttl: Duration::from_secs(3600),
        }
    }

    fn test_worker(db: &Arc<EtlDb>, api: Arc<StubApi>) -> Worker {
        Worker::new(Arc::clone(db), api, test_config())
    }

    #[tokio::test]
    async fn test_empty_queue_terminates_immediately() {
        let db = Arc::new(EtlDb::in_memory().unwrap());
        let api = Arc::new(StubApi::new());
        let worker = test_worker(&db, Arc::clone(&api));

        let summary = worker.run().await.unwrap();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert!(!db.lease_is_held().unwrap());
    }

    #[tokio::test]
    async fn test_end_to_end_fundamentals_run() {
        let db = Arc::new(EtlDb::in_memory().unwrap());
        db.enqueue(
            vec!["TSLA".to_string(), "MSFT".to_string()],
            JobType::Fundamentals,
        )
        .unwrap();

        let api = Arc::new(StubApi::new());
        let worker = test_worker(&db, Arc::clone(&api));
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(db.queue_len().unwrap(), 0);
        assert_eq!(db.result_count("fundamentals").unwrap(), 2);
        assert!(!db.lease_is_held().unwrap());

        let doc = db.document_for("fundamentals", "TSLA").unwrap().unwrap();
        assert_eq!(doc["fundamental"]["marketCap"], 750.12);
        assert_eq!(doc["fundamental"]["peRatio"], 10.02);
    }

    #[tokio::test]
    async fn test_price_history_run_lands_z_scores() {
        let db = Arc::new(EtlDb::in_memory().unwrap());
        db.enqueue(vec!["NVDA".to_string()], JobType::Signals).unwrap();

        let worker = test_worker(&db, Arc::new(StubApi::new()));
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.succeeded, 1);
        let doc = db.document_for("signals", "NVDA").unwrap().unwrap();
        assert_eq!(doc["meanVolume"], 20);
        assert_eq!(doc["candles"][0]["volzscore"], -1.2);
        assert_eq!(doc["candles"][2]["volzscore"], 1.2);
    }

    #[tokio::test]
    async fn test_lease_contention_fails_without_claims() {
        let db = Arc::new(EtlDb::in_memory().unwrap());
        db.enqueue(vec!["TSLA".to_string()], JobType::Fundamentals).unwrap();

        // Another run holds the lease.
        let holder = db.acquire_lease(Duration::from_secs(3600)).unwrap();

        let api = Arc::new(StubApi::new());
        let worker = test_worker(&db, Arc::clone(&api));
        let err = worker.run().await.unwrap_err();

        assert!(matches!(err, AppError::AlreadyWorking));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert_eq!(db.queue_len().unwrap(), 1);
        // The holder's lease survives the failed attempt.
        assert!(db.lease_is_held().unwrap());
        db.release_lease(holder).unwrap();
    }

    #[tokio::test]
    async fn test_call_failure_dead_letters_and_continues() {
        let db = Arc::new(EtlDb::in_memory().unwrap());
        db.enqueue(
            vec!["BAD".to_string(), "GOOD".to_string()],
            JobType::MediumTrend,
        )
        .unwrap();

        let worker = test_worker(&db, Arc::new(StubApi::failing(&["BAD"])));
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(db.queue_len().unwrap(), 0);
        assert_eq!(db.dead_letter_count().unwrap(), 1);
        assert_eq!(db.log_count("api-call").unwrap(), 1);
        assert!(db.document_for("medium_trend", "GOOD").unwrap().is_some());
        assert!(db.document_for("medium_trend", "BAD").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transform_failure_dead_letters_item() {
        /// Returns a payload the price-history transform rejects.
        struct EmptyPayloadApi;

        #[async_trait]
        impl MarketDataApi for EmptyPayloadApi {
            async fn call(&self, item: &WorkItem) -> Result<ApiSuccess> {
                Ok(ApiSuccess {
                    body: json!({ "symbol": item.symbol, "candles": [] }),
                    item: item.clone(),
                })
            }
        }

        let db = Arc::new(EtlDb::in_memory().unwrap());
        db.enqueue(vec!["TSLA".to_string()], JobType::ShortTrend).unwrap();

        let worker = Worker::new(Arc::clone(&db), Arc::new(EmptyPayloadApi), test_config());
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(db.queue_len().unwrap(), 0);
        assert_eq!(db.dead_letter_count().unwrap(), 1);
        assert_eq!(db.log_count("transform-load").unwrap(), 1);
    }
}
