//! Integration tests for the tick pipeline
//!
//! These tests drive the orchestrator end to end with in-memory collaborators:
//! - Admission gating (window, daily quota, warm-up progression)
//! - Claim, jitter-free submission and relocation
//! - Parse failures, rejected and timed-out submissions
//! - Ledger and source outages
//! - Concurrent ticks racing for the same item
//! - Manual processing, status reporting and history reset

use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::Tz;
use parking_lot::Mutex;
use prometheus_ramp::builders::OrchestratorBuilder;
use prometheus_ramp::config::RampConfig;
use prometheus_ramp::core::{
    AdmissionKind, AttemptSettings, AuditLedger, Destination, ItemStatus, Orchestrator,
    OutcomeKind, SubmissionClient, SubmissionError, TickStatus,
};
use prometheus_ramp::infra::{InMemoryLedger, InMemorySource};
use prometheus_ramp::runtime::{reset_history, scheduler_status};
use prometheus_ramp::util::{Jitter, ManualClock};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// HELPERS
// ============================================================================

/// Client answering from a script, defaulting to success.
#[derive(Default)]
struct ScriptedClient {
    responses: Mutex<VecDeque<Result<Value, SubmissionError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn script(&self, response: Result<Value, SubmissionError>) {
        self.responses.lock().push_back(response);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionClient for ScriptedClient {
    async fn submit(&self, payload: &Value) -> Result<Value, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.responses.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(json!({ "accepted": payload.clone() })))
    }
}

/// Client whose receiver accepts the payload while the ledger goes down.
struct OutageClient {
    ledger: Arc<InMemoryLedger>,
}

#[async_trait]
impl SubmissionClient for OutageClient {
    async fn submit(&self, _payload: &Value) -> Result<Value, SubmissionError> {
        self.ledger.set_available(false);
        Ok(json!({ "id": 7 }))
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    ledger: Arc<InMemoryLedger>,
    source: Arc<InMemorySource>,
    client: Arc<ScriptedClient>,
    orchestrator: Orchestrator,
}

fn utc(day: u32, hour: u32, minute: u32) -> chrono::DateTime<Tz> {
    Tz::UTC.with_ymd_and_hms(2025, 6, day, hour, minute, 0).unwrap()
}

fn settings() -> AttemptSettings {
    AttemptSettings {
        jitter: Jitter::none(),
        submit_timeout: Duration::from_millis(200),
    }
}

fn harness_with(cfg: RampConfig, client: ScriptedClient) -> Harness {
    prometheus_ramp::util::init_tracing();
    let clock = Arc::new(ManualClock::new(utc(1, 10, 30)));
    let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
    let source = Arc::new(InMemorySource::new());
    let client = Arc::new(client);
    let orchestrator = build(cfg, &clock, &ledger, &source, client.clone());
    Harness {
        clock,
        ledger,
        source,
        client,
        orchestrator,
    }
}

fn harness(cfg: RampConfig) -> Harness {
    harness_with(cfg, ScriptedClient::default())
}

fn build(
    cfg: RampConfig,
    clock: &Arc<ManualClock>,
    ledger: &Arc<InMemoryLedger>,
    source: &Arc<InMemorySource>,
    client: Arc<dyn SubmissionClient>,
) -> Orchestrator {
    OrchestratorBuilder::new(cfg)
        .with_clock(clock.clone())
        .with_ledger(ledger.clone())
        .with_source(source.clone())
        .with_reader(source.clone())
        .with_client(client)
        .with_settings(settings())
        .build()
        .unwrap()
}

fn quota(schedule: &[u32]) -> RampConfig {
    let mut cfg = RampConfig::default();
    cfg.warmup.schedule = schedule.to_vec();
    cfg
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn test_tick_submits_one_item() {
    let h = harness(RampConfig::default());
    h.source.push_json("a.txt", &json!({"url": "https://a.example"}));
    h.source.push_json("b.txt", &json!({"url": "https://b.example"}));

    let outcome = h.orchestrator.tick().await;

    assert_eq!(outcome.status, TickStatus::Success);
    assert_eq!(outcome.kind, OutcomeKind::Submitted);
    assert_eq!(outcome.item.as_deref(), Some("a.txt"));
    assert_eq!(outcome.remaining, 1);
    assert!(outcome.admission.unwrap().allowed);

    let item = h.ledger.get("a.txt").unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Succeeded);
    assert_eq!(item.payload, json!({"url": "https://a.example"}));
    assert_eq!(item.metadata.unwrap()["accepted"]["url"], "https://a.example");

    assert_eq!(h.source.relocations(), [("a.txt".to_string(), Destination::Processed)]);
    assert_eq!(h.source.pending_ids(), ["b.txt"]);
    assert_eq!(h.client.calls(), 1);

    let stats = outcome.stats.unwrap();
    assert_eq!(stats.ledger.succeeded, 1);
    assert_eq!(stats.admission.daily_processed, 1);
    assert_eq!(stats.admission.remaining_today, 49);
}

#[tokio::test]
async fn test_empty_queue_reports_no_work() {
    let h = harness(RampConfig::default());
    let outcome = h.orchestrator.tick().await;
    assert_eq!(outcome.status, TickStatus::NoWork);
    assert_eq!(outcome.kind, OutcomeKind::NoCandidates);
    assert_eq!(outcome.item, None);
    assert_eq!(h.client.calls(), 0);
}

#[tokio::test]
async fn test_each_tick_gets_its_own_id() {
    let h = harness(RampConfig::default());
    let a = h.orchestrator.tick().await;
    let b = h.orchestrator.tick().await;
    assert_ne!(a.tick_id, b.tick_id);
}

// ============================================================================
// ADMISSION
// ============================================================================

#[tokio::test]
async fn test_outside_window_skips_without_touching_anything() {
    let h = harness(RampConfig::default());
    h.clock.set(utc(1, 9, 15));
    h.source.push_json("a.txt", &json!({}));

    let outcome = h.orchestrator.tick().await;

    assert_eq!(outcome.status, TickStatus::Skipped);
    assert_eq!(outcome.kind, OutcomeKind::AdmissionDenied);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("Outside processing window. Current: 09:15, Allowed: 10:00-12:59")
    );
    assert_eq!(outcome.admission.unwrap().kind, AdmissionKind::OutsideWindow);
    assert_eq!(h.source.pending_ids(), ["a.txt"]);
    assert_eq!(h.ledger.aggregate_stats().unwrap().total, 0);
    assert_eq!(h.client.calls(), 0);
}

#[tokio::test]
async fn test_window_end_hour_is_inclusive() {
    let h = harness(RampConfig::default());
    h.clock.set(utc(1, 12, 59));
    h.source.push_json("a.txt", &json!({}));
    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Success);

    h.clock.set(utc(1, 13, 0));
    h.source.push_json("b.txt", &json!({}));
    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Skipped);
}

#[tokio::test]
async fn test_daily_quota_and_warmup_progression() {
    let h = harness(quota(&[2, 3]));
    for i in 0..6 {
        h.source.push_json(format!("{i}.txt"), &json!({ "n": i }));
    }

    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Success);
    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Success);
    let denied = h.orchestrator.tick().await;
    assert_eq!(denied.status, TickStatus::Skipped);
    assert_eq!(denied.reason.as_deref(), Some("Daily limit reached: 2/2 (Day 1)"));
    assert_eq!(denied.admission.unwrap().kind, AdmissionKind::QuotaExhausted);

    // Day 2 opens with the second quota and a fresh daily counter.
    h.clock.set(utc(2, 10, 0));
    let day2 = h.orchestrator.tick().await;
    assert_eq!(day2.status, TickStatus::Success);
    assert_eq!(
        day2.admission.unwrap().reason,
        "Can process. Progress: 0/3, Remaining: 3 (Day 2)"
    );
    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Success);
    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Success);
    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Skipped);

    // Past the schedule the last quota repeats.
    h.clock.set(utc(9, 11, 0));
    let snapshot = h.orchestrator.get_stats().unwrap().admission;
    assert_eq!(snapshot.warmup_day, 9);
    assert_eq!(snapshot.daily_limit, 3);
    assert_eq!(snapshot.daily_processed, 0);
}

#[tokio::test]
async fn test_disabled_warmup_ignores_window() {
    let mut cfg = RampConfig::default();
    cfg.warmup.enabled = false;
    let h = harness(cfg);
    h.clock.set(utc(1, 3, 0));
    h.source.push_json("a.txt", &json!({}));

    let outcome = h.orchestrator.tick().await;
    assert_eq!(outcome.status, TickStatus::Success);
    assert_eq!(outcome.admission.unwrap().kind, AdmissionKind::WarmupDisabled);
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_malformed_payload_is_audited_and_moved_to_failed() {
    let h = harness(RampConfig::default());
    h.source.push("bad.txt", "{not json");

    let outcome = h.orchestrator.tick().await;

    assert_eq!(outcome.status, TickStatus::Failed);
    assert_eq!(outcome.kind, OutcomeKind::ParseFailed);
    assert!(outcome.reason.unwrap().starts_with("invalid JSON"));
    let item = h.ledger.get("bad.txt").unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Failed);
    assert_eq!(item.payload, Value::Null);
    assert_eq!(item.attempt_count, 2);
    assert_eq!(h.source.relocations(), [("bad.txt".to_string(), Destination::Failed)]);
    assert_eq!(h.client.calls(), 0);
}

#[tokio::test]
async fn test_rejected_submission_is_never_retried() {
    let h = harness(RampConfig::default());
    h.client.script(Err(SubmissionError::Status {
        status: 503,
        body: "busy".into(),
    }));
    h.source.push_json("a.txt", &json!({}));

    let outcome = h.orchestrator.tick().await;
    assert_eq!(outcome.status, TickStatus::Failed);
    assert_eq!(outcome.kind, OutcomeKind::SubmissionFailed);
    assert_eq!(outcome.reason.as_deref(), Some("receiver returned status 503: busy"));
    assert_eq!(h.ledger.status_of("a.txt").unwrap(), ItemStatus::Failed);
    assert_eq!(h.source.relocations(), [("a.txt".to_string(), Destination::Failed)]);

    assert_eq!(h.orchestrator.tick().await.status, TickStatus::NoWork);
    assert_eq!(h.client.calls(), 1);
}

#[tokio::test]
async fn test_failed_item_left_in_pending_does_not_block_the_queue() {
    let h = harness(RampConfig::default());
    h.source.set_relocation_fails(true);
    h.client.script(Err(SubmissionError::Transport("connection reset".into())));
    h.source.push_json("a.txt", &json!({}));

    assert_eq!(h.orchestrator.tick().await.status, TickStatus::Failed);
    assert_eq!(h.source.pending_ids(), ["a.txt"]);

    h.source.push_json("b.txt", &json!({}));
    let outcome = h.orchestrator.tick().await;
    assert_eq!(outcome.status, TickStatus::Success);
    assert_eq!(outcome.item.as_deref(), Some("b.txt"));

    // Only the failed one is left; its claim is refused.
    h.source.set_relocation_fails(false);
    let outcome = h.orchestrator.tick().await;
    assert_eq!(outcome.status, TickStatus::Skipped);
    assert_eq!(outcome.kind, OutcomeKind::DuplicateClaim);
    assert_eq!(h.client.calls(), 2);
}

#[tokio::test]
async fn test_submission_timeout_is_a_failure() {
    let h = harness_with(RampConfig::default(), ScriptedClient::with_delay(Duration::from_secs(5)));
    h.source.push_json("slow.txt", &json!({}));

    let outcome = h.orchestrator.tick().await;

    assert_eq!(outcome.status, TickStatus::Failed);
    assert_eq!(outcome.kind, OutcomeKind::SubmissionFailed);
    assert!(outcome.reason.unwrap().contains("timed out"));
    let item = h.ledger.get("slow.txt").unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Failed);
    assert!(item.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_ledger_outage_aborts_before_any_mutation() {
    let h = harness(RampConfig::default());
    h.source.push_json("a.txt", &json!({}));
    h.ledger.set_available(false);

    let outcome = h.orchestrator.tick().await;

    assert_eq!(outcome.status, TickStatus::Error);
    assert_eq!(outcome.kind, OutcomeKind::LedgerUnavailable);
    assert!(outcome.stats.is_none());
    assert!(h.source.relocations().is_empty());
    assert_eq!(h.client.calls(), 0);
}

#[tokio::test]
async fn test_ledger_outage_after_submission_leaves_item_in_place() {
    let clock = Arc::new(ManualClock::new(utc(1, 10, 30)));
    let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
    let source = Arc::new(InMemorySource::new());
    let client = Arc::new(OutageClient { ledger: ledger.clone() });
    let orchestrator = build(RampConfig::default(), &clock, &ledger, &source, client);
    source.push_json("a.txt", &json!({}));

    let outcome = orchestrator.tick().await;

    assert_eq!(outcome.status, TickStatus::Error);
    assert_eq!(outcome.kind, OutcomeKind::LedgerUnavailable);
    assert_eq!(outcome.item.as_deref(), Some("a.txt"));
    assert!(source.relocations().is_empty());

    ledger.set_available(true);
    assert_eq!(ledger.status_of("a.txt").unwrap(), ItemStatus::Claimed);
}

#[tokio::test]
async fn test_source_outage_is_an_error() {
    let h = harness(RampConfig::default());
    h.source.set_listing_fails(true);

    let outcome = h.orchestrator.tick().await;
    assert_eq!(outcome.status, TickStatus::Error);
    assert_eq!(outcome.kind, OutcomeKind::SourceUnavailable);
    assert!(outcome.admission.is_some());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test]
async fn test_overlapping_ticks_submit_once() {
    let h = harness_with(RampConfig::default(), ScriptedClient::with_delay(Duration::from_millis(50)));
    h.source.push_json("only.txt", &json!({}));

    let (a, b) = tokio::join!(h.orchestrator.tick(), h.orchestrator.tick());

    let mut statuses = [a.status, b.status];
    statuses.sort_by_key(|s| s.as_str());
    assert_eq!(statuses, [TickStatus::Skipped, TickStatus::Success]);
    let loser = if a.status == TickStatus::Skipped { a } else { b };
    assert_eq!(loser.kind, OutcomeKind::DuplicateClaim);
    assert_eq!(h.client.calls(), 1);
    assert_eq!(h.ledger.status_of("only.txt").unwrap(), ItemStatus::Succeeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_sharing_a_ledger_never_double_submit() {
    let clock = Arc::new(ManualClock::new(utc(1, 11, 0)));
    let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
    let source = Arc::new(InMemorySource::new());
    let client = Arc::new(ScriptedClient::with_delay(Duration::from_millis(20)));
    source.push_json("shared.txt", &json!({}));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = build(RampConfig::default(), &clock, &ledger, &source, client.clone());
        handles.push(tokio::spawn(async move { orchestrator.tick().await }));
    }

    let mut successes = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        match outcome.status {
            TickStatus::Success => successes += 1,
            TickStatus::Skipped | TickStatus::NoWork => {}
            other => panic!("unexpected status {other:?}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(client.calls(), 1);
}

// ============================================================================
// HOUSEKEEPING, MANUAL RUNS AND OPERATOR API
// ============================================================================

#[tokio::test]
async fn test_already_succeeded_items_are_swept_to_processed() {
    let h = harness(RampConfig::default());
    assert!(h.ledger.try_claim("done.txt", &json!({})).unwrap());
    h.ledger.record_success("done.txt", &json!({})).unwrap();
    h.source.push_json("done.txt", &json!({}));
    h.source.push_json("new.txt", &json!({}));

    let outcome = h.orchestrator.tick().await;

    assert_eq!(outcome.item.as_deref(), Some("new.txt"));
    assert_eq!(outcome.remaining, 0);
    assert_eq!(
        h.source.relocations(),
        [
            ("done.txt".to_string(), Destination::Processed),
            ("new.txt".to_string(), Destination::Processed),
        ]
    );
    assert_eq!(h.client.calls(), 1);
}

#[tokio::test]
async fn test_process_item_bypasses_admission() {
    let h = harness(RampConfig::default());
    h.clock.set(utc(1, 2, 0));
    h.source.push_json("a.txt", &json!({}));
    h.source.push_json("b.txt", &json!({}));

    let outcome = h.orchestrator.process_item("b.txt").await;
    assert_eq!(outcome.status, TickStatus::Success);
    assert_eq!(outcome.item.as_deref(), Some("b.txt"));
    assert!(outcome.admission.is_none());
    assert_eq!(h.source.pending_ids(), ["a.txt"]);

    let missing = h.orchestrator.process_item("ghost.txt").await;
    assert_eq!(missing.status, TickStatus::NoWork);
    assert_eq!(missing.kind, OutcomeKind::UnknownCandidate);
    assert_eq!(missing.remaining, 1);
    assert_eq!(outcome.remaining, 1);
}

#[tokio::test]
async fn test_status_and_reset() {
    let h = harness(RampConfig::default());
    h.source.push_json("a.txt", &json!({}));
    h.source.push_json("b.txt", &json!({}));
    h.orchestrator.tick().await;

    let status = scheduler_status(&h.orchestrator);
    assert!(status.healthy);
    assert_eq!(status.pending_count, 1);
    let stats = status.stats.unwrap();
    assert_eq!(stats.ledger.succeeded, 1);
    assert_eq!(stats.admission.time_window, "10:00-12:59");
    assert_eq!(stats.admission.warmup_schedule, [50, 100, 200, 400, 800]);

    h.clock.set(utc(3, 10, 0));
    assert_eq!(h.orchestrator.get_stats().unwrap().admission.warmup_day, 3);

    let report = reset_history(h.ledger.as_ref()).unwrap();
    assert_eq!(report.deleted_count, 1);
    assert_eq!(h.orchestrator.get_stats().unwrap().admission.warmup_day, 1);

    h.ledger.set_available(false);
    let status = scheduler_status(&h.orchestrator);
    assert!(!status.healthy);
    assert!(status.error.unwrap().contains("unavailable"));
}
