//! Directory-backed candidate source.
//!
//! Queued items are files in a pending directory; finished ones are moved
//! into sibling processed/failed directories under the same file name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::{Candidate, CandidateSource, Destination, ParseError, PayloadReader, SourceError};

/// Lists files with a given extension in a pending directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    pending: PathBuf,
    processed: PathBuf,
    failed: PathBuf,
    extension: String,
}

impl DirectorySource {
    /// Create a source over the three directories. `extension` is matched
    /// without the leading dot.
    pub fn new(
        pending: impl Into<PathBuf>,
        processed: impl Into<PathBuf>,
        failed: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        let extension = extension.into();
        Self {
            pending: pending.into(),
            processed: processed.into(),
            failed: failed.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Pending directory.
    pub fn pending_dir(&self) -> &Path {
        &self.pending
    }

    /// Directory for the given destination.
    pub fn dir_for(&self, destination: Destination) -> &Path {
        match destination {
            Destination::Processed => &self.processed,
            Destination::Failed => &self.failed,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == self.extension)
    }
}

impl CandidateSource for DirectorySource {
    fn list_pending(&self) -> Result<Vec<Candidate>, SourceError> {
        let entries = match fs::read_dir(&self.pending) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("pending directory does not exist: {}", self.pending.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(&self.pending, &e)),
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.pending, &e))?.path();
            if !self.matches(&path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!("skipping non UTF-8 file name in {}", self.pending.display());
                continue;
            };
            candidates.push(Candidate::new(name, path.to_string_lossy()));
        }
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates)
    }

    fn relocate(&self, candidate: &Candidate, destination: Destination) -> Result<(), SourceError> {
        let dir = self.dir_for(destination);
        fs::create_dir_all(dir).map_err(|e| io_error(dir, &e))?;
        let from = Path::new(&candidate.locator);
        let to = dir.join(&candidate.id);
        if fs::rename(from, &to).is_err() {
            // Cross-device moves cannot be renamed.
            fs::copy(from, &to).map_err(|e| io_error(from, &e))?;
            fs::remove_file(from).map_err(|e| io_error(from, &e))?;
        }
        tracing::info!("moved {} to {}", candidate.id, dir.display());
        Ok(())
    }
}

/// Reads a candidate's locator as a UTF-8 JSON file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileReader;

impl PayloadReader for JsonFileReader {
    fn read(&self, candidate: &Candidate) -> Result<Value, ParseError> {
        let raw = fs::read_to_string(&candidate.locator)
            .map_err(|e| ParseError::Io(format!("{}: {e}", candidate.locator)))?;
        serde_json::from_str(&raw).map_err(|e| ParseError::Malformed(e.to_string()))
    }
}

fn io_error(path: &Path, err: &io::Error) -> SourceError {
    SourceError::Io(format!("{}: {err}", path.display()))
}
