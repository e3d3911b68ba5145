//! Result store: latest normalized document per symbol
//!
//! Each job type has its own table holding one JSON document per symbol,
//! overwritten on every successful run. Table names come from the static
//! job dispatch table, never from user input.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// Upsert the normalized document for a symbol.
pub fn upsert_document(
    conn: &Connection,
    table: &'static str,
    symbol: &str,
    doc: &Value,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {table} (symbol, doc, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(symbol) DO UPDATE SET
             doc = excluded.doc,
             updated_at = excluded.updated_at"
    );
    conn.execute(&sql, params![symbol, doc.to_string()])?;
    Ok(())
}

/// Read back the latest document for a symbol.
pub fn document_for(conn: &Connection, table: &'static str, symbol: &str) -> Result<Option<Value>> {
    let sql = format!("SELECT doc FROM {table} WHERE symbol = ?1");
    let raw = conn
        .query_row(&sql, params![symbol], |row| row.get::<_, String>(0))
        .optional()?;
    match raw {
        Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
        None => Ok(None),
    }
}

/// Number of documents in a result table.
pub fn count(conn: &Connection, table: &'static str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}
