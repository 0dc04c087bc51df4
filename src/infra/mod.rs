//! Infrastructure adapters for ledgers, candidate sources, and submission.

pub mod ledger;
pub mod source;
pub mod submit;
pub use ledger::InMemoryLedger;
pub use ledger::SqliteLedger;
pub use source::{DirectorySource, InMemorySource, JsonFileReader};
pub use submit::HttpSubmissionClient;
