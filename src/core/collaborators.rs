//! Collaborator seams consumed by the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ParseError, SourceError, SubmissionError};

/// A queued item as seen by the candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Identity used as the ledger key.
    pub id: String,
    /// Where the payload lives (a path, an object key, ...).
    pub locator: String,
}

impl Candidate {
    /// Build a candidate.
    pub fn new(id: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
        }
    }
}

/// Area a finished candidate is moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Submitted successfully.
    Processed,
    /// Parse or submission failure.
    Failed,
}

/// Read-only listing of queued work plus relocation of finished items.
///
/// Races between concurrent listings are harmless: the ledger claim decides
/// who processes an item.
pub trait CandidateSource: Send + Sync {
    /// Queued candidates in FIFO order.
    fn list_pending(&self) -> Result<Vec<Candidate>, SourceError>;

    /// Move a candidate out of the pending area.
    fn relocate(&self, candidate: &Candidate, destination: Destination) -> Result<(), SourceError>;
}

/// Loads and decodes a candidate's payload.
pub trait PayloadReader: Send + Sync {
    /// Read the payload; malformed content is a [`ParseError`].
    fn read(&self, candidate: &Candidate) -> Result<Value, ParseError>;
}

/// Outbound submission to the rate-sensitive receiver.
///
/// The orchestrator enforces its own hard timeout around this call;
/// implementations may add a transport-level one as well.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// Submit a payload, returning the receiver's metadata on success.
    async fn submit(&self, payload: &Value) -> Result<Value, SubmissionError>;
}
