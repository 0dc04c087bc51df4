//! Error types for ledger, collaborator and configuration operations.
//!
//! Each collaborator seam has its own closed enum so the orchestrator can
//! pattern-match on the failure kind instead of inspecting messages.

use std::time::Duration;

use thiserror::Error;

/// Failures of the audit ledger's backing store.
///
/// A ledger error aborts the current tick before any further mutation or
/// relocation happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The store could not be reached or refused the operation.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// A stored record could not be decoded.
    #[error("ledger record corrupt: {0}")]
    Corrupt(String),
}

/// Failures reading a candidate's payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The payload could not be read at all.
    #[error("failed to read payload: {0}")]
    Io(String),
    /// The payload was read but is not valid JSON.
    #[error("invalid JSON: {0}")]
    Malformed(String),
}

/// Failures of the outbound submission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    /// Network-level failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),
    /// The receiver answered with a non-success status.
    #[error("receiver returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },
    /// No answer within the hard timeout.
    #[error("submission timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// A success response whose body could not be decoded.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

/// Failures of the candidate source (listing or relocation).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Filesystem or backend I/O failure.
    #[error("candidate source I/O error: {0}")]
    Io(String),
}

/// Invalid or unloadable configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// An environment variable could not be interpreted.
    #[error("environment variable {name}: {message}")]
    Env {
        /// Variable name.
        name: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Failures that end a tick before any item is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The candidate source could not be listed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Application-facing result using anyhow for assembly-time contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
