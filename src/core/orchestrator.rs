//! Gated, claim-based processing of one queued item per invocation.
//!
//! `tick()` is safe to call repeatedly and from several processes at once:
//! every coordination decision goes through [`AuditLedger::try_claim`], so
//! two ticks racing on the same candidate resolve to exactly one attempt.
//! No error crosses the public boundary; every path ends in a
//! [`TickOutcome`] carrying a status, a closed [`OutcomeKind`] and a reason.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{
    AdmissionController, AdmissionDecision, AdmissionSnapshot, AuditLedger, Candidate,
    CandidateSource, Destination, ItemStatus, LedgerError, LedgerStats, ParseError, PayloadReader,
    PipelineError, SubmissionClient, SubmissionError,
};
use crate::util::clock::Clock;
use crate::util::jitter::Jitter;

/// Machine-checkable status of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    /// Nothing attempted: admission denied or the claim was lost.
    Skipped,
    /// Admission allowed but nothing is queued.
    NoWork,
    /// The item was submitted and recorded.
    Success,
    /// The item failed and was recorded.
    Failed,
    /// The tick aborted on infrastructure failure; nothing was relocated.
    Error,
}

impl TickStatus {
    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::NoWork => "no_work",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Why a tick ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The admission controller denied the attempt.
    AdmissionDenied,
    /// No queued candidates.
    NoCandidates,
    /// A manually requested candidate is not queued.
    UnknownCandidate,
    /// Another invocation holds the claim.
    DuplicateClaim,
    /// Submission succeeded.
    Submitted,
    /// The payload could not be parsed.
    ParseFailed,
    /// The receiver rejected the submission, or it failed or timed out.
    SubmissionFailed,
    /// The ledger was unavailable.
    LedgerUnavailable,
    /// The candidate source could not be listed.
    SourceUnavailable,
}

/// Ledger counters plus the admission view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Aggregate ledger counters.
    pub ledger: LedgerStats,
    /// Admission state.
    pub admission: AdmissionSnapshot,
}

/// Structured result of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// Correlation id, also attached to the tick's tracing span.
    pub tick_id: Uuid,
    /// Overall status.
    pub status: TickStatus,
    /// Closed reason kind to branch on.
    pub kind: OutcomeKind,
    /// Human-readable reason.
    pub reason: Option<String>,
    /// Identity of the attempted candidate.
    pub item: Option<String>,
    /// Other candidates still queued.
    pub remaining: usize,
    /// Admission decision taken at the start of the tick.
    pub admission: Option<AdmissionDecision>,
    /// Stats after the tick; `None` when the ledger could not be read.
    pub stats: Option<StatsSnapshot>,
}

/// Collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    /// Where queued work is listed and relocated.
    pub source: Arc<dyn CandidateSource>,
    /// How payloads are read.
    pub reader: Arc<dyn PayloadReader>,
    /// Outbound receiver.
    pub client: Arc<dyn SubmissionClient>,
}

/// Per-attempt timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSettings {
    /// Delay drawn before each submission.
    pub jitter: Jitter,
    /// Hard timeout around the submission call.
    pub submit_timeout: Duration,
}

impl Default for AttemptSettings {
    fn default() -> Self {
        Self {
            jitter: Jitter::from_secs(30, 60),
            submit_timeout: Duration::from_secs(30),
        }
    }
}

struct Attempt {
    status: TickStatus,
    kind: OutcomeKind,
    reason: String,
}

impl Attempt {
    fn duplicate(id: &str) -> Self {
        Self {
            status: TickStatus::Skipped,
            kind: OutcomeKind::DuplicateClaim,
            reason: format!("{id} already claimed by another worker"),
        }
    }
}

struct Scan {
    queued: Vec<(Candidate, ItemStatus)>,
    stale: Vec<Candidate>,
}

/// Result of reading and claiming a candidate.
enum Claim {
    /// The claim was won; the payload is ready to submit.
    Won(Value),
    /// The attempt ended before submission.
    Settled(Attempt),
}

/// Drives one gated attempt per invocation.
///
/// Ledger and source calls are synchronous and may block on I/O or store
/// locks, so each step runs on tokio's blocking pool. Only the jitter sleep
/// and the bounded submission are awaited on the caller's executor.
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
}

/// The synchronous steps of a tick.
struct Pipeline {
    ledger: Arc<dyn AuditLedger>,
    admission: AdmissionController,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    settings: AttemptSettings,
}

impl Orchestrator {
    /// Assemble an orchestrator from already constructed components.
    pub fn new(
        ledger: Arc<dyn AuditLedger>,
        admission: AdmissionController,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        settings: AttemptSettings,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                ledger,
                admission,
                collaborators,
                clock,
                settings,
            }),
        }
    }

    /// The shared ledger.
    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        &self.pipeline.ledger
    }

    /// The admission controller.
    pub fn admission(&self) -> &AdmissionController {
        &self.pipeline.admission
    }

    /// Timing knobs in effect.
    pub fn settings(&self) -> AttemptSettings {
        self.pipeline.settings
    }

    /// Run one gated attempt.
    pub async fn tick(&self) -> TickOutcome {
        let tick_id = Uuid::new_v4();
        let span = tracing::info_span!("tick", %tick_id);
        self.run_tick(tick_id).instrument(span).await
    }

    /// Attempt a specific queued candidate, bypassing admission.
    pub async fn process_item(&self, id: &str) -> TickOutcome {
        let tick_id = Uuid::new_v4();
        let span = tracing::info_span!("process_item", %tick_id, item = id);
        self.run_manual(tick_id, id).instrument(span).await
    }

    /// Ledger counters plus the admission snapshot at the clock's time.
    ///
    /// Blocks on the ledger; from async code prefer the stats attached to
    /// each [`TickOutcome`].
    pub fn get_stats(&self) -> Result<StatsSnapshot, LedgerError> {
        self.pipeline.get_stats()
    }

    /// Queued candidates not yet succeeded, in listing order.
    pub fn pending(&self) -> Result<Vec<Candidate>, PipelineError> {
        Ok(self.pipeline.scan()?.queued.into_iter().map(|(c, _)| c).collect())
    }

    /// Run a synchronous step on the blocking pool inside the current span.
    async fn blocking<T, E, F>(&self, step: F) -> Result<T, E>
    where
        F: FnOnce(&Pipeline) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<LedgerError> + Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            step(&pipeline)
        })
        .await
        .map_err(|e| E::from(LedgerError::Unavailable(format!("ledger task failed: {e}"))))?
    }

    async fn run_tick(&self, tick_id: Uuid) -> TickOutcome {
        tracing::info!("starting tick");
        let now = self.pipeline.clock.now();

        let decision = match self.blocking(move |p| p.admission.evaluate(&now)).await {
            Ok(decision) => decision,
            Err(e) => return self.aborted(tick_id, None, None, PipelineError::Ledger(e)).await,
        };
        tracing::info!("admission check: {}", decision.reason);

        if !decision.allowed {
            tracing::warn!("cannot process: {}", decision.reason);
            let reason = decision.reason.clone();
            return self
                .finish(
                    tick_id,
                    Attempt {
                        status: TickStatus::Skipped,
                        kind: OutcomeKind::AdmissionDenied,
                        reason,
                    },
                    None,
                    0,
                    Some(decision),
                )
                .await;
        }

        let scan = match self.blocking(Pipeline::scan_and_sweep).await {
            Ok(scan) => scan,
            Err(e) => return self.aborted(tick_id, None, Some(decision), e).await,
        };

        let Some(index) = Pipeline::select(&scan.queued) else {
            tracing::info!("no pending items to process");
            return self
                .finish(
                    tick_id,
                    Attempt {
                        status: TickStatus::NoWork,
                        kind: OutcomeKind::NoCandidates,
                        reason: "no pending items".into(),
                    },
                    None,
                    0,
                    Some(decision),
                )
                .await;
        };

        let remaining = scan.queued.len() - 1;
        let candidate = scan.queued[index].0.clone();
        tracing::info!("processing {} ({} remaining in queue)", candidate.id, remaining);

        let id = candidate.id.clone();
        match self.attempt(candidate).await {
            Ok(attempt) => {
                self.finish(tick_id, attempt, Some(id), remaining, Some(decision))
                    .await
            }
            Err(e) => {
                self.aborted(tick_id, Some(id), Some(decision), PipelineError::Ledger(e))
                    .await
            }
        }
    }

    async fn run_manual(&self, tick_id: Uuid, id: &str) -> TickOutcome {
        tracing::info!("manual processing requested");
        let mut scan = match self.blocking(Pipeline::scan_and_sweep).await {
            Ok(scan) => scan,
            Err(e) => return self.aborted(tick_id, Some(id.to_string()), None, e).await,
        };
        let Some(index) = scan.queued.iter().position(|(c, _)| c.id == id) else {
            tracing::warn!("{} is not queued", id);
            let remaining = scan.queued.len();
            return self
                .finish(
                    tick_id,
                    Attempt {
                        status: TickStatus::NoWork,
                        kind: OutcomeKind::UnknownCandidate,
                        reason: format!("{id} is not queued"),
                    },
                    Some(id.to_string()),
                    remaining,
                    None,
                )
                .await;
        };
        let (candidate, _) = scan.queued.remove(index);
        let remaining = scan.queued.len();

        match self.attempt(candidate).await {
            Ok(attempt) => {
                self.finish(tick_id, attempt, Some(id.to_string()), remaining, None)
                    .await
            }
            Err(e) => {
                self.aborted(tick_id, Some(id.to_string()), None, PipelineError::Ledger(e))
                    .await
            }
        }
    }

    async fn attempt(&self, candidate: Candidate) -> Result<Attempt, LedgerError> {
        let claiming = candidate.clone();
        let payload = match self.blocking(move |p| p.read_and_claim(&claiming)).await? {
            Claim::Won(payload) => payload,
            Claim::Settled(attempt) => return Ok(attempt),
        };

        let delay = self.pipeline.settings.jitter.sample();
        if !delay.is_zero() {
            tracing::info!("applying jitter of {}ms for {}", delay.as_millis(), candidate.id);
            tokio::time::sleep(delay).await;
        }

        let result = self.submit(&payload).await;
        self.blocking(move |p| p.settle(&candidate, result)).await
    }

    async fn submit(&self, payload: &Value) -> Result<Value, SubmissionError> {
        let timeout = self.pipeline.settings.submit_timeout;
        tokio::time::timeout(timeout, self.pipeline.collaborators.client.submit(payload))
            .await
            .unwrap_or(Err(SubmissionError::Timeout(timeout)))
    }

    async fn stats_or_none(&self) -> Option<StatsSnapshot> {
        match self.blocking(Pipeline::get_stats).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::error!("failed to collect stats: {}", e);
                None
            }
        }
    }

    async fn finish(
        &self,
        tick_id: Uuid,
        attempt: Attempt,
        item: Option<String>,
        remaining: usize,
        admission: Option<AdmissionDecision>,
    ) -> TickOutcome {
        let stats = self.stats_or_none().await;
        if let Some(stats) = &stats {
            tracing::info!(
                "tick completed: {} (daily progress {}/{})",
                attempt.status.as_str(),
                stats.admission.daily_processed,
                stats.admission.daily_limit
            );
        }
        TickOutcome {
            tick_id,
            status: attempt.status,
            kind: attempt.kind,
            reason: Some(attempt.reason),
            item,
            remaining,
            admission,
            stats,
        }
    }

    async fn aborted(
        &self,
        tick_id: Uuid,
        item: Option<String>,
        admission: Option<AdmissionDecision>,
        error: PipelineError,
    ) -> TickOutcome {
        tracing::error!("tick aborted: {}", error);
        let kind = match error {
            PipelineError::Ledger(_) => OutcomeKind::LedgerUnavailable,
            PipelineError::Source(_) => OutcomeKind::SourceUnavailable,
        };
        TickOutcome {
            tick_id,
            status: TickStatus::Error,
            kind,
            reason: Some(error.to_string()),
            item,
            remaining: 0,
            admission,
            stats: self.stats_or_none().await,
        }
    }
}

impl Pipeline {
    fn get_stats(&self) -> Result<StatsSnapshot, LedgerError> {
        let now = self.clock.now();
        Ok(StatsSnapshot {
            ledger: self.ledger.aggregate_stats()?,
            admission: self.admission.snapshot(&now)?,
        })
    }

    /// List candidates, dropping those the ledger already marks succeeded.
    fn scan(&self) -> Result<Scan, PipelineError> {
        let listed = self.collaborators.source.list_pending()?;
        let mut queued = Vec::with_capacity(listed.len());
        let mut stale = Vec::new();
        for candidate in listed {
            match self.ledger.status_of(&candidate.id)? {
                ItemStatus::Succeeded => stale.push(candidate),
                status => queued.push((candidate, status)),
            }
        }
        tracing::debug!("{} queued, {} already succeeded", queued.len(), stale.len());
        Ok(Scan { queued, stale })
    }

    fn scan_and_sweep(&self) -> Result<Scan, PipelineError> {
        let scan = self.scan()?;
        for candidate in &scan.stale {
            tracing::warn!("{} already succeeded, moving out of pending", candidate.id);
            self.relocate(candidate, Destination::Processed);
        }
        Ok(scan)
    }

    /// Prefer the first item the ledger has never seen; otherwise the first
    /// listed one, whose claim is then expected to be lost.
    fn select(queued: &[(Candidate, ItemStatus)]) -> Option<usize> {
        if queued.is_empty() {
            return None;
        }
        Some(
            queued
                .iter()
                .position(|(_, status)| *status == ItemStatus::Pending)
                .unwrap_or(0),
        )
    }

    fn read_and_claim(&self, candidate: &Candidate) -> Result<Claim, LedgerError> {
        let payload = match self.collaborators.reader.read(candidate) {
            Ok(payload) => payload,
            Err(e) => return self.fail_unreadable(candidate, &e).map(Claim::Settled),
        };
        tracing::debug!("payload preview: {}", preview(&payload));

        if !self.ledger.try_claim(&candidate.id, &payload)? {
            tracing::warn!("{} already claimed by another worker", candidate.id);
            return Ok(Claim::Settled(Attempt::duplicate(&candidate.id)));
        }
        Ok(Claim::Won(payload))
    }

    /// Record a parse failure through a claim so it leaves an audit record.
    fn fail_unreadable(&self, candidate: &Candidate, error: &ParseError) -> Result<Attempt, LedgerError> {
        tracing::error!("payload error in {}: {}", candidate.id, error);
        if !self.ledger.try_claim(&candidate.id, &Value::Null)? {
            tracing::warn!("{} already claimed by another worker", candidate.id);
            return Ok(Attempt::duplicate(&candidate.id));
        }
        let message = error.to_string();
        self.ledger.record_failure(&candidate.id, &message)?;
        self.relocate(candidate, Destination::Failed);
        Ok(Attempt {
            status: TickStatus::Failed,
            kind: OutcomeKind::ParseFailed,
            reason: message,
        })
    }

    /// Record the submission result and move the candidate accordingly.
    fn settle(
        &self,
        candidate: &Candidate,
        result: Result<Value, SubmissionError>,
    ) -> Result<Attempt, LedgerError> {
        match result {
            Ok(metadata) => {
                self.ledger.record_success(&candidate.id, &metadata)?;
                self.relocate(candidate, Destination::Processed);
                tracing::info!("successfully processed {}", candidate.id);
                Ok(Attempt {
                    status: TickStatus::Success,
                    kind: OutcomeKind::Submitted,
                    reason: format!("{} submitted", candidate.id),
                })
            }
            Err(e) => {
                let message = e.to_string();
                self.ledger.record_failure(&candidate.id, &message)?;
                self.relocate(candidate, Destination::Failed);
                tracing::error!("failed to process {}: {}", candidate.id, message);
                Ok(Attempt {
                    status: TickStatus::Failed,
                    kind: OutcomeKind::SubmissionFailed,
                    reason: message,
                })
            }
        }
    }

    fn relocate(&self, candidate: &Candidate, destination: Destination) {
        match self.collaborators.source.relocate(candidate, destination) {
            Ok(()) => tracing::info!("moved {} to {:?}", candidate.id, destination),
            Err(e) => tracing::error!("failed to move {} to {:?}: {}", candidate.id, destination, e),
        }
    }
}

fn preview(payload: &Value) -> String {
    let text = payload.to_string();
    match text.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}
