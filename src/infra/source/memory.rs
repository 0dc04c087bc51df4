//! In-memory candidate source for tests and embedding.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::{Candidate, CandidateSource, Destination, ParseError, PayloadReader, SourceError};

#[derive(Default)]
struct State {
    pending: Vec<(Candidate, String)>,
    relocated: Vec<(Candidate, String, Destination)>,
}

/// Queue of raw payloads kept in insertion order.
///
/// Acts as both [`CandidateSource`] and [`PayloadReader`]; the raw text is
/// parsed on read so malformed payloads can be exercised.
#[derive(Default)]
pub struct InMemorySource {
    state: Mutex<State>,
    listing_fails: AtomicBool,
    relocation_fails: AtomicBool,
}

impl InMemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue raw payload text under `id`.
    pub fn push(&self, id: impl Into<String>, raw: impl Into<String>) {
        let id = id.into();
        let candidate = Candidate::new(id.clone(), format!("memory://{id}"));
        self.state.lock().pending.push((candidate, raw.into()));
    }

    /// Enqueue a JSON payload under `id`.
    pub fn push_json(&self, id: impl Into<String>, payload: &Value) {
        self.push(id, payload.to_string());
    }

    /// Ids still pending, in queue order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.state.lock().pending.iter().map(|(c, _)| c.id.clone()).collect()
    }

    /// Every relocation performed so far, oldest first.
    pub fn relocations(&self) -> Vec<(String, Destination)> {
        self.state
            .lock()
            .relocated
            .iter()
            .map(|(c, _, d)| (c.id.clone(), *d))
            .collect()
    }

    /// Make `list_pending` fail until reset.
    pub fn set_listing_fails(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::Release);
    }

    /// Make `relocate` fail until reset.
    pub fn set_relocation_fails(&self, fails: bool) {
        self.relocation_fails.store(fails, Ordering::Release);
    }
}

impl CandidateSource for InMemorySource {
    fn list_pending(&self) -> Result<Vec<Candidate>, SourceError> {
        if self.listing_fails.load(Ordering::Acquire) {
            return Err(SourceError::Io("in-memory source marked unavailable".into()));
        }
        Ok(self.state.lock().pending.iter().map(|(c, _)| c.clone()).collect())
    }

    fn relocate(&self, candidate: &Candidate, destination: Destination) -> Result<(), SourceError> {
        if self.relocation_fails.load(Ordering::Acquire) {
            return Err(SourceError::Io(format!("cannot move {}", candidate.id)));
        }
        let mut state = self.state.lock();
        let Some(pos) = state.pending.iter().position(|(c, _)| c.id == candidate.id) else {
            return Err(SourceError::Io(format!("{} is not pending", candidate.id)));
        };
        let (candidate, raw) = state.pending.remove(pos);
        state.relocated.push((candidate, raw, destination));
        Ok(())
    }
}

impl PayloadReader for InMemorySource {
    fn read(&self, candidate: &Candidate) -> Result<Value, ParseError> {
        let state = self.state.lock();
        let raw = state
            .pending
            .iter()
            .find(|(c, _)| c.id == candidate.id)
            .map(|(_, raw)| raw)
            .ok_or_else(|| ParseError::Io(format!("{} not found", candidate.id)))?;
        serde_json::from_str(raw).map_err(|e| ParseError::Malformed(e.to_string()))
    }
}
