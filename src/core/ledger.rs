//! Audit ledger contract and work item lifecycle types.
//!
//! The ledger is the only shared mutable resource of the pipeline. Its
//! [`AuditLedger::try_claim`] is the single linearization point: an identity
//! can be claimed successfully at most once over the ledger's whole history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::LedgerError;

/// Lifecycle status of a work item.
///
/// Items absent from the ledger are `Pending`; the only entry transition is
/// `Pending -> Claimed`, the only exits are `Claimed -> Succeeded` (terminal)
/// and `Claimed -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Not yet seen by the ledger.
    Pending,
    /// Claimed by exactly one orchestrator, attempt in flight.
    Claimed,
    /// Submitted successfully.
    Succeeded,
    /// Attempt failed.
    Failed,
}

impl ItemStatus {
    /// Stable lowercase name used in storage and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(LedgerError::Corrupt(format!("unknown status `{other}`"))),
        }
    }
}

/// A unit of work as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identity (e.g. a file name).
    pub id: String,
    /// Opaque payload captured at claim time.
    pub payload: Value,
    /// Current lifecycle status.
    pub status: ItemStatus,
    /// When the claim happened.
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the item succeeded.
    pub finished_at: Option<DateTime<Utc>>,
    /// When the item last failed.
    pub failed_at: Option<DateTime<Utc>>,
    /// Number of attempts; starts at 1 on claim, bumped on each failure.
    pub attempt_count: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Receiver metadata stored on success.
    pub metadata: Option<Value>,
}

impl WorkItem {
    /// A freshly claimed item.
    pub fn claimed(id: impl Into<String>, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            payload,
            status: ItemStatus::Claimed,
            claimed_at: Some(now),
            finished_at: None,
            failed_at: None,
            attempt_count: 1,
            last_error: None,
            metadata: None,
        }
    }

    /// Apply `Claimed -> Succeeded`. Returns `false` (and changes nothing)
    /// from any other status.
    pub fn mark_succeeded(&mut self, metadata: Value, now: DateTime<Utc>) -> bool {
        if self.status != ItemStatus::Claimed {
            return false;
        }
        self.status = ItemStatus::Succeeded;
        self.finished_at = Some(now);
        self.metadata = Some(metadata);
        true
    }

    /// Apply `Claimed -> Failed`, bumping the attempt counter. Returns
    /// `false` (and changes nothing) from any other status.
    pub fn mark_failed(&mut self, error_message: &str, now: DateTime<Utc>) -> bool {
        if self.status != ItemStatus::Claimed {
            return false;
        }
        self.status = ItemStatus::Failed;
        self.failed_at = Some(now);
        self.last_error = Some(error_message.to_string());
        self.attempt_count = self.attempt_count.saturating_add(1);
        true
    }
}

/// Aggregate counters over the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Records of any status.
    pub total: u64,
    /// Records in `Succeeded`.
    pub succeeded: u64,
    /// Records in `Claimed`.
    pub claimed: u64,
    /// Records in `Failed`.
    pub failed: u64,
    /// `succeeded / total` as a percentage, 0 for an empty ledger.
    pub success_rate: f64,
}

impl LedgerStats {
    /// Build stats from raw counts.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(total: u64, succeeded: u64, claimed: u64, failed: u64) -> Self {
        let success_rate = if total > 0 {
            succeeded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            succeeded,
            claimed,
            failed,
            success_rate,
        }
    }
}

/// Durable per-item lifecycle store.
///
/// Implementations must make `try_claim` atomic (unique insert or
/// compare-and-set) and must never leave a record half-written when they
/// return [`LedgerError`].
pub trait AuditLedger: Send + Sync {
    /// Atomically insert `id` as `Claimed` with `attempt_count = 1`.
    /// Returns `false` without mutating anything if `id` already exists.
    fn try_claim(&self, id: &str, payload: &Value) -> Result<bool, LedgerError>;

    /// `Claimed -> Succeeded`, storing receiver metadata. A missing or
    /// non-claimed id is a logged no-op.
    fn record_success(&self, id: &str, metadata: &Value) -> Result<(), LedgerError>;

    /// `Claimed -> Failed`, storing the error and bumping `attempt_count`.
    /// A missing or non-claimed id is a logged no-op.
    fn record_failure(&self, id: &str, error_message: &str) -> Result<(), LedgerError>;

    /// Number of `Succeeded` items whose `finished_at >= since`.
    fn count_succeeded_since(&self, since: DateTime<Utc>) -> Result<u64, LedgerError>;

    /// Earliest `finished_at` among `Succeeded` items.
    fn first_succeeded_at(&self) -> Result<Option<DateTime<Utc>>, LedgerError>;

    /// Counters over all records.
    fn aggregate_stats(&self) -> Result<LedgerStats, LedgerError>;

    /// Look up a single record.
    fn get(&self, id: &str) -> Result<Option<WorkItem>, LedgerError>;

    /// Delete every record, returning how many were removed. Restarts the
    /// warm-up at day 1.
    fn reset(&self) -> Result<u64, LedgerError>;

    /// Status of `id`, `Pending` when the ledger has never seen it.
    fn status_of(&self, id: &str) -> Result<ItemStatus, LedgerError> {
        Ok(self
            .get(id)?
            .map_or(ItemStatus::Pending, |item| item.status))
    }
}
