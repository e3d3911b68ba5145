//! Worker lease
//!
//! A single-row lease guards against overlapping worker runs. Unlike a
//! bare boolean flag, the lease carries an owner id and an expiry, so a
//! crashed run stops blocking new ones once its TTL lapses.

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::time::Duration;
use uuid::Uuid;

/// Acquire the worker lease. Fails fast with `AlreadyWorking` when a
/// live (unexpired) lease is held by someone else; an expired lease is
/// taken over.
pub fn acquire(conn: &mut Connection, ttl: Duration) -> Result<Uuid> {
    let now = Utc::now();
    let owner = Uuid::new_v4();
    let expires = now + chrono::Duration::from_std(ttl).expect("lease ttl within chrono range");

    let tx = conn.transaction()?;

    let current: Option<String> = tx
        .query_row(
            "SELECT expires_at FROM worker_lease WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(raw) = current {
        let held_until = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| AppError::Decode(format!("lease expires_at: {}", e)))?;
        if now < held_until.with_timezone(&Utc) {
            return Err(AppError::AlreadyWorking);
        }
        tracing::warn!("Taking over expired worker lease (expired {})", raw);
    }

    tx.execute(
        "INSERT INTO worker_lease (id, owner, acquired_at, expires_at)
         VALUES (1, ?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             owner = excluded.owner,
             acquired_at = excluded.acquired_at,
             expires_at = excluded.expires_at",
        params![owner.to_string(), now.to_rfc3339(), expires.to_rfc3339()],
    )?;
    tx.commit()?;

    tracing::info!("Worker lease acquired by {}", owner);
    Ok(owner)
}

/// Release the lease if still held by `owner`. A takeover by a later run
/// leaves the row alone.
pub fn release(conn: &Connection, owner: Uuid) -> Result<()> {
    conn.execute(
        "DELETE FROM worker_lease WHERE id = 1 AND owner = ?1",
        params![owner.to_string()],
    )?;
    Ok(())
}

/// Whether a live lease currently exists.
pub fn is_held(conn: &Connection) -> Result<bool> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT expires_at FROM worker_lease WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(expires) => {
            let held_until = DateTime::parse_from_rfc3339(&expires)
                .map_err(|e| AppError::Decode(format!("lease expires_at: {}", e)))?;
            Ok(Utc::now() < held_until.with_timezone(&Utc))
        }
        None => Ok(false),
    }
}
