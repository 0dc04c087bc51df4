//! Candidate sources and payload readers.

pub mod fs;
pub mod memory;

pub use fs::{DirectorySource, JsonFileReader};
pub use memory::InMemorySource;
