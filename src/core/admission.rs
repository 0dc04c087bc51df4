//! Warm-up admission control.
//!
//! The controller is a pure decision function over `now`, ledger-derived
//! aggregates and the static [`AdmissionPolicy`]: it reads the ledger but
//! never writes to it, so identical ledger state and `now` always yield the
//! same decision.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::core::{AuditLedger, LedgerError, QuotaSchedule, TimeWindow};
use crate::util::clock::{local_date, start_of_day, Clock};

/// Why an admission decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionKind {
    /// Warm-up gating is switched off; everything is admitted.
    WarmupDisabled,
    /// Inside the window with quota to spare.
    Allowed,
    /// Current hour is outside the configured window.
    OutsideWindow,
    /// Today's quota is used up.
    QuotaExhausted,
}

impl AdmissionKind {
    /// Whether this kind admits work.
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::WarmupDisabled | Self::Allowed)
    }
}

/// Outcome of [`AdmissionController::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    /// Whether a submission may start now.
    pub allowed: bool,
    /// Machine-checkable reason.
    pub kind: AdmissionKind,
    /// Human-readable reason.
    pub reason: String,
    /// Warm-up day, when it was computed.
    pub warmup_day: Option<u32>,
    /// Quota for the warm-up day, when it was computed.
    pub daily_quota: Option<u32>,
    /// Successes so far today, when they were counted.
    pub daily_count: Option<u64>,
}

/// Monitoring view of the admission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionSnapshot {
    /// Whether warm-up gating is active.
    pub warmup_enabled: bool,
    /// Current warm-up day (1-based).
    pub warmup_day: u32,
    /// Quota for the current warm-up day.
    pub daily_limit: u32,
    /// Successes since the start of today.
    pub daily_processed: u64,
    /// Quota left today, never negative.
    pub remaining_today: u64,
    /// Result of evaluating admission at the snapshot instant.
    pub can_process: bool,
    /// Machine-checkable reason.
    pub kind: AdmissionKind,
    /// Human-readable reason.
    pub reason: String,
    /// Window label such as `10:00-12:59`.
    pub time_window: String,
    /// Whether the snapshot instant is inside the window.
    pub in_time_window: bool,
    /// Full quota schedule.
    pub warmup_schedule: Vec<u32>,
}

/// Static admission policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Whether warm-up gating is active.
    pub enabled: bool,
    /// Quota per warm-up day.
    pub schedule: QuotaSchedule,
    /// Allowed hours.
    pub window: TimeWindow,
}

/// Gate deciding whether the orchestrator may attempt a submission.
pub struct AdmissionController {
    policy: AdmissionPolicy,
    ledger: Arc<dyn AuditLedger>,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    /// Create a controller reading aggregates from `ledger`.
    pub fn new(policy: AdmissionPolicy, ledger: Arc<dyn AuditLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            ledger,
            clock,
        }
    }

    /// The static policy.
    pub const fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// 1 if nothing has succeeded yet, otherwise days elapsed since the first
    /// success's local date, plus one.
    pub fn warmup_day(&self, now: &DateTime<Tz>) -> Result<u32, LedgerError> {
        let Some(first) = self.ledger.first_succeeded_at()? else {
            return Ok(1);
        };
        let first_date = local_date(&first, now.timezone());
        let elapsed = (now.date_naive() - first_date).num_days().max(0);
        Ok(u32::try_from(elapsed + 1).unwrap_or(u32::MAX))
    }

    /// Successes since the start of `now`'s local day.
    pub fn daily_count(&self, now: &DateTime<Tz>) -> Result<u64, LedgerError> {
        self.ledger.count_succeeded_since(start_of_day(now))
    }

    /// Decide whether a submission may start at `now`.
    pub fn evaluate(&self, now: &DateTime<Tz>) -> Result<AdmissionDecision, LedgerError> {
        if !self.policy.enabled {
            return Ok(self.decide(now, 1, 0));
        }
        let day = self.warmup_day(now)?;
        let daily = if self.policy.window.contains(now) {
            self.daily_count(now)?
        } else {
            0
        };
        Ok(self.decide(now, day, daily))
    }

    /// Pure decision over already read aggregates.
    fn decide(&self, now: &DateTime<Tz>, day: u32, daily: u64) -> AdmissionDecision {
        if !self.policy.enabled {
            return AdmissionDecision {
                allowed: true,
                kind: AdmissionKind::WarmupDisabled,
                reason: "Warm-up disabled, no rate limiting".into(),
                warmup_day: None,
                daily_quota: None,
                daily_count: None,
            };
        }

        let quota = self.policy.schedule.quota_for_day(day);
        tracing::debug!("warm-up day {day} daily limit: {quota}");

        if !self.policy.window.contains(now) {
            return AdmissionDecision {
                allowed: false,
                kind: AdmissionKind::OutsideWindow,
                reason: format!(
                    "Outside processing window. Current: {}, Allowed: {}",
                    now.format("%H:%M"),
                    self.policy.window
                ),
                warmup_day: Some(day),
                daily_quota: Some(quota),
                daily_count: None,
            };
        }

        let (allowed, kind, reason) = if daily < u64::from(quota) {
            let remaining = u64::from(quota) - daily;
            (
                true,
                AdmissionKind::Allowed,
                format!("Can process. Progress: {daily}/{quota}, Remaining: {remaining} (Day {day})"),
            )
        } else {
            (
                false,
                AdmissionKind::QuotaExhausted,
                format!("Daily limit reached: {daily}/{quota} (Day {day})"),
            )
        };

        AdmissionDecision {
            allowed,
            kind,
            reason,
            warmup_day: Some(day),
            daily_quota: Some(quota),
            daily_count: Some(daily),
        }
    }

    /// [`evaluate`](Self::evaluate) at the clock's current time.
    pub fn evaluate_now(&self) -> Result<AdmissionDecision, LedgerError> {
        self.evaluate(&self.clock.now())
    }

    /// Full monitoring view at `now`, computed regardless of `enabled`.
    ///
    /// The ledger is read once; the decision fields are derived from the
    /// same counts as the progress fields.
    pub fn snapshot(&self, now: &DateTime<Tz>) -> Result<AdmissionSnapshot, LedgerError> {
        let day = self.warmup_day(now)?;
        let limit = self.policy.schedule.quota_for_day(day);
        let processed = self.daily_count(now)?;
        let decision = self.decide(now, day, processed);

        Ok(AdmissionSnapshot {
            warmup_enabled: self.policy.enabled,
            warmup_day: day,
            daily_limit: limit,
            daily_processed: processed,
            remaining_today: u64::from(limit).saturating_sub(processed),
            can_process: decision.allowed,
            kind: decision.kind,
            reason: decision.reason,
            time_window: self.policy.window.to_string(),
            in_time_window: self.policy.window.contains(now),
            warmup_schedule: self.policy.schedule.as_slice().to_vec(),
        })
    }

    /// [`snapshot`](Self::snapshot) at the clock's current time.
    pub fn snapshot_now(&self) -> Result<AdmissionSnapshot, LedgerError> {
        self.snapshot(&self.clock.now())
    }
}
