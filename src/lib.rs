//! market-etl - queued market-data ingestion
//!
//! A durable (symbol, job) work queue drives a single-flight worker
//! against a rate-limited upstream market-data API: claim -> call ->
//! transform -> load, with every raw response audited and failed items
//! dead-lettered instead of dropped.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod token;
pub mod transform;
pub mod worker;

pub use config::Config;
pub use db::EtlDb;
pub use error::{AppError, Result};
pub use jobs::{JobType, Stage, WorkItem};
