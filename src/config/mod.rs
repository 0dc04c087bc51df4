//! Configuration models for warm-up, jitter, submission, storage and ledger.

pub mod ramp;

pub use ramp::{
    JitterConfig, LedgerBackendConfig, RampConfig, StorageConfig, SubmissionConfig, WarmupConfig,
};
