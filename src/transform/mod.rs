//! Per-job transform functions
//!
//! Pure functions mapping a raw API payload to the persisted document
//! shape. The load step is the caller's separate write.

pub mod fundamentals;
pub mod price_history;

use crate::api::types::PriceHistory;
use crate::error::Result;
use crate::jobs::JobType;
use serde_json::Value;

/// Normalize a raw payload for a job into the document to persist.
pub fn transform(job: JobType, symbol: &str, body: &Value) -> Result<Value> {
    match job {
        JobType::Fundamentals => fundamentals::normalize(body, symbol),
        JobType::MediumTrend | JobType::ShortTrend | JobType::Signals => {
            let mut ph: PriceHistory = serde_json::from_value(body.clone())?;
            // Some upstream responses omit the symbol echo; the work item
            // is authoritative either way.
            if ph.symbol.is_empty() {
                ph.symbol = symbol.to_string();
            }
            let doc = price_history::normalize(&ph)?;
            Ok(serde_json::to_value(&doc)?)
        }
    }
}
