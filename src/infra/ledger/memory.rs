//! In-memory ledger for development and testing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::{AuditLedger, ItemStatus, LedgerError, LedgerStats, WorkItem};
use crate::util::clock::Clock;

/// Mutex-guarded map of work items.
///
/// Claims are atomic within one process; use
/// [`SqliteLedger`](super::SqliteLedger) to coordinate several processes.
pub struct InMemoryLedger {
    items: Mutex<HashMap<String, WorkItem>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryLedger {
    /// Create an empty ledger timestamping with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a store outage: while unavailable every operation fails with
    /// [`LedgerError::Unavailable`] and nothing is mutated.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Snapshot of all records, sorted by id.
    pub fn items(&self) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self.items.lock().values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    fn ensure_available(&self) -> Result<(), LedgerError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("in-memory ledger marked unavailable".into()))
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }
}

impl AuditLedger for InMemoryLedger {
    fn try_claim(&self, id: &str, payload: &Value) -> Result<bool, LedgerError> {
        self.ensure_available()?;
        let now = self.now();
        match self.items.lock().entry(id.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!("{} already processed or processing", id);
                Ok(false)
            }
            Entry::Vacant(slot) => {
                slot.insert(WorkItem::claimed(id, payload.clone(), now));
                tracing::info!("claimed {}", id);
                Ok(true)
            }
        }
    }

    fn record_success(&self, id: &str, metadata: &Value) -> Result<(), LedgerError> {
        self.ensure_available()?;
        let now = self.now();
        let mut items = self.items.lock();
        let Some(item) = items.get_mut(id) else {
            tracing::warn!("ignoring success for unknown item {}", id);
            return Ok(());
        };
        if item.mark_succeeded(metadata.clone(), now) {
            tracing::info!("marked {} as succeeded", id);
        } else {
            tracing::warn!("ignoring success for {} in status {}", id, item.status);
        }
        Ok(())
    }

    fn record_failure(&self, id: &str, error_message: &str) -> Result<(), LedgerError> {
        self.ensure_available()?;
        let now = self.now();
        let mut items = self.items.lock();
        let Some(item) = items.get_mut(id) else {
            tracing::warn!("ignoring failure for unknown item {}", id);
            return Ok(());
        };
        if item.mark_failed(error_message, now) {
            tracing::error!("marked {} as failed: {}", id, error_message);
        } else {
            tracing::warn!("ignoring failure for {} in status {}", id, item.status);
        }
        Ok(())
    }

    fn count_succeeded_since(&self, since: DateTime<Utc>) -> Result<u64, LedgerError> {
        self.ensure_available()?;
        let count = self
            .items
            .lock()
            .values()
            .filter(|i| i.status == ItemStatus::Succeeded && i.finished_at.is_some_and(|t| t >= since))
            .count();
        Ok(count as u64)
    }

    fn first_succeeded_at(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
        self.ensure_available()?;
        Ok(self
            .items
            .lock()
            .values()
            .filter(|i| i.status == ItemStatus::Succeeded)
            .filter_map(|i| i.finished_at)
            .min())
    }

    fn aggregate_stats(&self) -> Result<LedgerStats, LedgerError> {
        self.ensure_available()?;
        let items = self.items.lock();
        let count = |status: ItemStatus| items.values().filter(|i| i.status == status).count() as u64;
        Ok(LedgerStats::from_counts(
            items.len() as u64,
            count(ItemStatus::Succeeded),
            count(ItemStatus::Claimed),
            count(ItemStatus::Failed),
        ))
    }

    fn get(&self, id: &str) -> Result<Option<WorkItem>, LedgerError> {
        self.ensure_available()?;
        Ok(self.items.lock().get(id).cloned())
    }

    fn reset(&self) -> Result<u64, LedgerError> {
        self.ensure_available()?;
        let mut items = self.items.lock();
        let removed = items.len() as u64;
        items.clear();
        tracing::warn!("ledger reset, {} records removed", removed);
        Ok(removed)
    }
}
