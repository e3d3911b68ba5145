//! SQLite database module

mod audit;
mod lease;
mod migrations;
mod queue;
mod results;

pub use audit::RawResponse;

use crate::error::Result;
use crate::jobs::{JobType, WorkItem};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// SQLite-backed store for the queue, audit trail, results, and lease.
pub struct EtlDb {
    conn: Mutex<Connection>,
}

impl EtlDb {
    /// Open (or create) the database file and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Queue Methods ==========

    /// Bulk-enqueue symbols for a job; idempotent on (symbol, job).
    pub fn enqueue<I>(&self, symbols: I, job: JobType) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        let mut conn = self.conn.lock();
        queue::enqueue(&mut conn, symbols, job)
    }

    /// Reset every queued item to pending (crash recovery at run start).
    pub fn reset_all_to_pending(&self) -> Result<usize> {
        let conn = self.conn.lock();
        queue::reset_all_to_pending(&conn)
    }

    /// Claim one pending item; `None` means the queue is drained.
    pub fn claim_one(&self) -> Result<Option<WorkItem>> {
        let conn = self.conn.lock();
        queue::claim_one(&conn)
    }

    /// Mark a claimed item as in-transform.
    pub fn advance_stage(&self, item: &WorkItem) -> Result<()> {
        let conn = self.conn.lock();
        queue::advance_stage(&conn, item)
    }

    /// Delete a successfully finished item.
    pub fn remove(&self, item: &WorkItem) -> Result<()> {
        let conn = self.conn.lock();
        queue::remove(&conn, item)
    }

    /// Move a failed item to the dead-letter table.
    pub fn move_to_dead_letter(&self, item: &WorkItem, error: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        queue::move_to_dead_letter(&mut conn, item, error)
    }

    /// Items currently queued, any stage.
    pub fn queue_len(&self) -> Result<i64> {
        let conn = self.conn.lock();
        queue::len(&conn)
    }

    /// Items parked in the dead-letter table.
    pub fn dead_letter_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        queue::dead_letter_count(&conn)
    }

    // ========== Audit Methods ==========

    /// Upsert the latest raw upstream response for an item.
    pub fn record_response(&self, item: &WorkItem, response: &RawResponse) -> Result<()> {
        let conn = self.conn.lock();
        audit::record_response(&conn, item, response)
    }

    /// Read back the recorded response for an item.
    pub fn response_for(&self, item: &WorkItem) -> Result<Option<RawResponse>> {
        let conn = self.conn.lock();
        audit::response_for(&conn, item)
    }

    /// Append a run-log row.
    pub fn log_event(&self, message: &str, category: &str) -> Result<()> {
        let conn = self.conn.lock();
        audit::log_event(&conn, message, category)
    }

    /// Count run-log rows in a category.
    pub fn log_count(&self, category: &str) -> Result<i64> {
        let conn = self.conn.lock();
        audit::log_count(&conn, category)
    }

    // ========== Result Store Methods ==========

    /// Upsert the normalized document for a symbol into a job's table.
    pub fn upsert_document(&self, table: &'static str, symbol: &str, doc: &Value) -> Result<()> {
        let conn = self.conn.lock();
        results::upsert_document(&conn, table, symbol, doc)
    }

    /// Latest document for a symbol in a job's table.
    pub fn document_for(&self, table: &'static str, symbol: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock();
        results::document_for(&conn, table, symbol)
    }

    /// Number of documents in a result table.
    pub fn result_count(&self, table: &'static str) -> Result<i64> {
        let conn = self.conn.lock();
        results::count(&conn, table)
    }

    // ========== Lease Methods ==========

    /// Acquire the worker lease, failing fast when one is live.
    pub fn acquire_lease(&self, ttl: Duration) -> Result<Uuid> {
        let mut conn = self.conn.lock();
        lease::acquire(&mut conn, ttl)
    }

    /// Release the lease held by `owner`.
    pub fn release_lease(&self, owner: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        lease::release(&conn, owner)
    }

    /// Whether a live lease exists.
    pub fn lease_is_held(&self) -> Result<bool> {
        let conn = self.conn.lock();
        lease::is_held(&conn)
    }
}
