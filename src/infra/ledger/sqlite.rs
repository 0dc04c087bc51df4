//! SQLite-backed ledger.
//!
//! The `PRIMARY KEY` on `id` plus `INSERT OR IGNORE` gives an atomic
//! insert-if-absent that holds across processes sharing the database file.
//! Lifecycle updates are guarded by `status = 'claimed'` so a record can
//! never leave a terminal state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::core::{AuditLedger, ItemStatus, LedgerError, LedgerStats, WorkItem};
use crate::util::clock::Clock;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ITEM_COLUMNS: &str = "id, payload, status, claimed_at, finished_at, failed_at, \
                            attempt_count, last_error, metadata";

/// Durable ledger stored in a single SQLite database.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteLedger {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        let conn = Connection::open(path.as_ref()).map_err(unavailable)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(unavailable)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(unavailable)?;
        tracing::debug!("sqlite ledger journal mode: {}", mode);
        Self::bootstrap(conn, clock)
    }

    /// Private in-memory database, mainly for tests.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::bootstrap(conn, clock)
    }

    /// Schema statements applied on open.
    pub fn migrations() -> &'static [&'static str] {
        &[r"
CREATE TABLE IF NOT EXISTS ramp_work_items (
    id TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    status TEXT NOT NULL,
    claimed_at TEXT,
    finished_at TEXT,
    failed_at TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 1,
    last_error TEXT,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_ramp_work_items_status ON ramp_work_items (status);
CREATE INDEX IF NOT EXISTS idx_ramp_work_items_finished ON ramp_work_items (status, finished_at);
"]
    }

    fn bootstrap(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        for statement in Self::migrations() {
            conn.execute_batch(statement).map_err(unavailable)?;
        }
        tracing::info!("sqlite ledger schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn now(&self) -> String {
        encode_ts(&self.clock.now().with_timezone(&Utc))
    }

    fn status_of_raw(conn: &Connection, id: &str) -> Result<Option<String>, LedgerError> {
        conn.query_row(
            "SELECT status FROM ramp_work_items WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<RawItem> {
        Ok(RawItem {
            id: row.get(0)?,
            payload: row.get(1)?,
            status: row.get(2)?,
            claimed_at: row.get(3)?,
            finished_at: row.get(4)?,
            failed_at: row.get(5)?,
            attempt_count: row.get(6)?,
            last_error: row.get(7)?,
            metadata: row.get(8)?,
        })
    }
}

struct RawItem {
    id: String,
    payload: String,
    status: String,
    claimed_at: Option<String>,
    finished_at: Option<String>,
    failed_at: Option<String>,
    attempt_count: i64,
    last_error: Option<String>,
    metadata: Option<String>,
}

impl RawItem {
    fn decode(self) -> Result<WorkItem, LedgerError> {
        Ok(WorkItem {
            payload: decode_json(&self.payload)?,
            status: self.status.parse()?,
            claimed_at: self.claimed_at.as_deref().map(decode_ts).transpose()?,
            finished_at: self.finished_at.as_deref().map(decode_ts).transpose()?,
            failed_at: self.failed_at.as_deref().map(decode_ts).transpose()?,
            attempt_count: u32::try_from(self.attempt_count).map_err(|_| {
                LedgerError::Corrupt(format!("attempt_count {} out of range", self.attempt_count))
            })?,
            last_error: self.last_error,
            metadata: self.metadata.as_deref().map(decode_json).transpose()?,
            id: self.id,
        })
    }
}

impl AuditLedger for SqliteLedger {
    fn try_claim(&self, id: &str, payload: &Value) -> Result<bool, LedgerError> {
        let payload = encode_json(payload)?;
        let now = self.now();
        let inserted = self
            .conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO ramp_work_items (id, payload, status, claimed_at, attempt_count)
                 VALUES (?1, ?2, 'claimed', ?3, 1)",
                params![id, payload, now],
            )
            .map_err(unavailable)?;
        if inserted == 1 {
            tracing::info!("claimed {}", id);
            Ok(true)
        } else {
            tracing::warn!("{} already processed or processing", id);
            Ok(false)
        }
    }

    fn record_success(&self, id: &str, metadata: &Value) -> Result<(), LedgerError> {
        let metadata = encode_json(metadata)?;
        let now = self.now();
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE ramp_work_items SET status = 'succeeded', finished_at = ?2, metadata = ?3
                 WHERE id = ?1 AND status = 'claimed'",
                params![id, now, metadata],
            )
            .map_err(unavailable)?;
        if updated == 1 {
            tracing::info!("marked {} as succeeded", id);
        } else {
            match Self::status_of_raw(&conn, id)? {
                Some(status) => tracing::warn!("ignoring success for {} in status {}", id, status),
                None => tracing::warn!("ignoring success for unknown item {}", id),
            }
        }
        Ok(())
    }

    fn record_failure(&self, id: &str, error_message: &str) -> Result<(), LedgerError> {
        let now = self.now();
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE ramp_work_items
                 SET status = 'failed', failed_at = ?2, last_error = ?3, attempt_count = attempt_count + 1
                 WHERE id = ?1 AND status = 'claimed'",
                params![id, now, error_message],
            )
            .map_err(unavailable)?;
        if updated == 1 {
            tracing::error!("marked {} as failed: {}", id, error_message);
        } else {
            match Self::status_of_raw(&conn, id)? {
                Some(status) => tracing::warn!("ignoring failure for {} in status {}", id, status),
                None => tracing::warn!("ignoring failure for unknown item {}", id),
            }
        }
        Ok(())
    }

    fn count_succeeded_since(&self, since: DateTime<Utc>) -> Result<u64, LedgerError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM ramp_work_items WHERE status = 'succeeded' AND finished_at >= ?1",
                params![encode_ts(&since)],
                |row| row.get(0),
            )
            .map_err(unavailable)?;
        to_count(count)
    }

    fn first_succeeded_at(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let first: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT MIN(finished_at) FROM ramp_work_items WHERE status = 'succeeded'",
                [],
                |row| row.get(0),
            )
            .map_err(unavailable)?;
        first.as_deref().map(decode_ts).transpose()
    }

    fn aggregate_stats(&self) -> Result<LedgerStats, LedgerError> {
        let (total, succeeded, claimed, failed): (i64, i64, i64, i64) = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'succeeded' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'claimed' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0)
                 FROM ramp_work_items",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(unavailable)?;
        Ok(LedgerStats::from_counts(
            to_count(total)?,
            to_count(succeeded)?,
            to_count(claimed)?,
            to_count(failed)?,
        ))
    }

    fn get(&self, id: &str) -> Result<Option<WorkItem>, LedgerError> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM ramp_work_items WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()
            .map_err(unavailable)?;
        raw.map(RawItem::decode).transpose()
    }

    fn reset(&self) -> Result<u64, LedgerError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM ramp_work_items", [])
            .map_err(unavailable)?;
        tracing::warn!("ledger reset, {} records removed", removed);
        Ok(removed as u64)
    }
}

fn unavailable(err: rusqlite::Error) -> LedgerError {
    LedgerError::Unavailable(err.to_string())
}

fn to_count(value: i64) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::Corrupt(format!("negative count {value}")))
}

// Fixed-width UTC text keeps lexicographic and chronological order aligned.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("timestamp `{raw}`: {e}")))
}

fn encode_json(value: &Value) -> Result<String, LedgerError> {
    serde_json::to_string(value).map_err(|e| LedgerError::Corrupt(e.to_string()))
}

fn decode_json(raw: &str) -> Result<Value, LedgerError> {
    serde_json::from_str(raw).map_err(|e| LedgerError::Corrupt(e.to_string()))
}
