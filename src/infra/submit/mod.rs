//! Submission clients.

pub mod http;

pub use http::HttpSubmissionClient;
