//! Core pipeline: ledger contract, admission control and orchestration.

pub mod admission;
pub mod collaborators;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod policy;

pub use admission::{
    AdmissionController, AdmissionDecision, AdmissionKind, AdmissionPolicy, AdmissionSnapshot,
};
pub use collaborators::{Candidate, CandidateSource, Destination, PayloadReader, SubmissionClient};
pub use error::{
    AppResult, ConfigError, LedgerError, ParseError, PipelineError, SourceError, SubmissionError,
};
pub use ledger::{AuditLedger, ItemStatus, LedgerStats, WorkItem};
pub use orchestrator::{
    AttemptSettings, Collaborators, Orchestrator, OutcomeKind, StatsSnapshot, TickOutcome,
    TickStatus,
};
pub use policy::{QuotaSchedule, TimeWindow};
