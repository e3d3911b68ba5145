//! Work queue operations
//!
//! The queue is a durable collection of (symbol, job) work items. The
//! UNIQUE(symbol, job) constraint makes enqueueing idempotent; re-adding
//! an existing item is a no-op rather than a duplicate.

use crate::error::{AppError, Result};
use crate::jobs::{JobType, Stage, WorkItem};
use rusqlite::{params, Connection, OptionalExtension};

/// Rows written per bulk-upsert batch.
const BATCH_SIZE: usize = 100;

/// Bulk-enqueue symbols for a job. Returns the number of symbols
/// processed (including ones already queued).
pub fn enqueue<I>(conn: &mut Connection, symbols: I, job: JobType) -> Result<usize>
where
    I: IntoIterator<Item = String>,
{
    let mut count = 0usize;
    let mut batch: Vec<String> = Vec::with_capacity(BATCH_SIZE);

    for symbol in symbols {
        batch.push(symbol);
        if batch.len() == BATCH_SIZE {
            write_batch(conn, &batch, job)?;
            count += batch.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        write_batch(conn, &batch, job)?;
        count += batch.len();
    }

    // Audit trail row after the bulk insert completes.
    conn.execute(
        "INSERT INTO logs (message, category) VALUES (?1, ?2)",
        params![format!("queue up complete: {} symbols for {}", count, job), "enqueue"],
    )?;

    tracing::info!("Enqueued {} symbols for job {}", count, job);
    Ok(count)
}

fn write_batch(conn: &mut Connection, symbols: &[String], job: JobType) -> Result<()> {
    let tx = conn.transaction()?;
    {
        // ON CONFLICT DO NOTHING keeps the batch unordered: an already
        // queued item never blocks the rest of the batch.
        let mut stmt = tx.prepare(
            "INSERT INTO queue (symbol, job, stage) VALUES (?1, ?2, ?3)
             ON CONFLICT(symbol, job) DO NOTHING",
        )?;
        for symbol in symbols {
            stmt.execute(params![symbol, job.as_str(), Stage::Pending.as_str()])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Reset every queue item to pending. Called at worker start so items
/// left in-transform by a crashed run are picked up again.
pub fn reset_all_to_pending(conn: &Connection) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE queue SET stage = ?1",
        params![Stage::Pending.as_str()],
    )?;
    Ok(changed)
}

/// Claim one pending item. `None` means the queue is drained and is the
/// worker loop's sole termination signal, so a row that fails to parse
/// must surface as an error: mapping it to `None` would wedge the queue
/// on that row forever.
pub fn claim_one(conn: &Connection) -> Result<Option<WorkItem>> {
    let row = conn
        .query_row(
            "SELECT symbol, job, stage FROM queue WHERE stage = ?1 LIMIT 1",
            params![Stage::Pending.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((symbol, job, stage)) => {
            let job = JobType::from_str(&job).ok_or_else(|| {
                AppError::Decode(format!("queue row {}: unknown job {:?}", symbol, job))
            })?;
            let stage = Stage::from_str(&stage).ok_or_else(|| {
                AppError::Decode(format!("queue row {}: unknown stage {:?}", symbol, stage))
            })?;
            Ok(Some(WorkItem { symbol, job, stage }))
        }
    }
}

/// Advance a claimed item to in-transform. Done after the API call
/// succeeds so a crash during transform does not trigger a re-fetch on a
/// restart that skips the pending reset.
pub fn advance_stage(conn: &Connection, item: &WorkItem) -> Result<()> {
    conn.execute(
        "UPDATE queue SET stage = ?1 WHERE symbol = ?2 AND job = ?3",
        params![Stage::InTransform.as_str(), item.symbol, item.job.as_str()],
    )?;
    Ok(())
}

/// Delete a finished item from the queue.
pub fn remove(conn: &Connection, item: &WorkItem) -> Result<()> {
    conn.execute(
        "DELETE FROM queue WHERE symbol = ?1 AND job = ?2",
        params![item.symbol, item.job.as_str()],
    )?;
    Ok(())
}

/// Move a failed item out of the queue into the dead-letter table with
/// the error that killed it. Dead letters are never retried automatically.
pub fn move_to_dead_letter(conn: &mut Connection, item: &WorkItem, error: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO dead_letters (symbol, job, error) VALUES (?1, ?2, ?3)",
        params![item.symbol, item.job.as_str(), error],
    )?;
    tx.execute(
        "DELETE FROM queue WHERE symbol = ?1 AND job = ?2",
        params![item.symbol, item.job.as_str()],
    )?;
    tx.commit()?;
    Ok(())
}

/// Number of items currently queued, any stage.
pub fn len(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
    Ok(count)
}

/// Number of dead-lettered items.
pub fn dead_letter_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
    Ok(count)
}
