//! Operator-facing status and maintenance models.

use serde::{Deserialize, Serialize};

use crate::core::{AuditLedger, LedgerError, Orchestrator, StatsSnapshot};

/// Point-in-time report of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// False when the ledger or source could not be read.
    pub healthy: bool,
    /// Candidates waiting in the pending area.
    pub pending_count: usize,
    /// Ledger counters and admission state.
    pub stats: Option<StatsSnapshot>,
    /// What went wrong when unhealthy.
    pub error: Option<String>,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Result of clearing the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    /// Records removed.
    pub deleted_count: u64,
    /// Human-readable summary.
    pub message: String,
}

/// Collect the status report; failures are reported in the payload.
pub fn scheduler_status(orchestrator: &Orchestrator) -> SchedulerStatus {
    let report = orchestrator
        .pending()
        .map_err(|e| e.to_string())
        .and_then(|pending| {
            let stats = orchestrator.get_stats().map_err(|e| e.to_string())?;
            Ok((pending.len(), stats))
        });
    match report {
        Ok((pending_count, stats)) => SchedulerStatus {
            healthy: true,
            pending_count,
            stats: Some(stats),
            error: None,
        },
        Err(error) => {
            tracing::error!("error getting status: {}", error);
            SchedulerStatus {
                healthy: false,
                pending_count: 0,
                stats: None,
                error: Some(error),
            }
        }
    }
}

/// Clear all processing history so the warm-up restarts at day 1.
pub fn reset_history(ledger: &dyn AuditLedger) -> Result<ResetReport, LedgerError> {
    tracing::warn!("resetting warm-up schedule, clearing all processing history");
    let deleted_count = ledger.reset()?;
    Ok(ResetReport {
        deleted_count,
        message: "Warm-up schedule reset successfully".into(),
    })
}

/// Return a health payload.
pub const fn health() -> Health {
    Health { ok: true }
}
