//! Raw-response audit trail and run logs
//!
//! Every upstream call is recorded keyed by (symbol, job), success or
//! failure, with only the latest attempt retained. This is a debug trail,
//! not authoritative data.

use crate::error::Result;
use crate::jobs::WorkItem;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// Snapshot of one upstream response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
    /// Serialized request (method + full URL) for reproduction.
    pub request: String,
}

/// Upsert the latest raw response for a work item.
pub fn record_response(conn: &Connection, item: &WorkItem, response: &RawResponse) -> Result<()> {
    conn.execute(
        "INSERT INTO api_responses (symbol, job, status, body, request, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
         ON CONFLICT(symbol, job) DO UPDATE SET
             status = excluded.status,
             body = excluded.body,
             request = excluded.request,
             created_at = excluded.created_at",
        params![
            item.symbol,
            item.job.as_str(),
            response.status,
            response.body.to_string(),
            response.request,
        ],
    )?;
    Ok(())
}

/// Fetch the recorded response for a work item, if any.
pub fn response_for(conn: &Connection, item: &WorkItem) -> Result<Option<RawResponse>> {
    let row = conn
        .query_row(
            "SELECT status, body, request FROM api_responses WHERE symbol = ?1 AND job = ?2",
            params![item.symbol, item.job.as_str()],
            |row| {
                Ok((
                    row.get::<_, u16>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((status, body, request)) => Ok(Some(RawResponse {
            status,
            body: serde_json::from_str(&body)?,
            request,
        })),
        None => Ok(None),
    }
}

/// Append a run-log row. Failures here are reported by the caller but
/// never abort a run.
pub fn log_event(conn: &Connection, message: &str, category: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO logs (message, category) VALUES (?1, ?2)",
        params![message, category],
    )?;
    Ok(())
}

/// Count log rows in a category.
pub fn log_count(conn: &Connection, category: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM logs WHERE category = ?1",
        params![category],
        |row| row.get(0),
    )?;
    Ok(count)
}
