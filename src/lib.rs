//! # Prometheus Ramp
//!
//! A warm-up gated, claim-based submission pipeline.
//!
//! Queued payloads are forwarded to a rate-sensitive receiver one at a time.
//! Each invocation of [`Orchestrator::tick`](core::Orchestrator::tick) asks
//! the admission controller whether work may start, claims one candidate in
//! the audit ledger, waits a random jitter, submits it and records the
//! result. A periodic trigger outside this crate calls `tick` on its own
//! schedule.
//!
//! ## Core Problem Solved
//!
//! A new sender that suddenly pushes high volume to a receiver looks abusive.
//! Volume has to ramp up gradually:
//!
//! - **Daily quota schedule**: day 1 allows the first quota, day 2 the second,
//!   and the last value repeats afterwards
//! - **Time window**: submissions only start within configured local hours
//! - **Exactly-once claims**: concurrent workers never submit the same item twice
//! - **Durable audit trail**: every claim, success and failure is recorded
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prometheus_ramp::builders::OrchestratorBuilder;
//! use prometheus_ramp::config::RampConfig;
//!
//! prometheus_ramp::util::init_tracing();
//! let orchestrator = OrchestratorBuilder::new(RampConfig::from_env()?).build()?;
//!
//! let outcome = orchestrator.tick().await;
//! println!("{}: {:?}", outcome.status.as_str(), outcome.reason);
//! ```
//!
//! Tests inject a [`ManualClock`](util::ManualClock), an
//! [`InMemoryLedger`](infra::InMemoryLedger) and an
//! [`InMemorySource`](infra::InMemorySource) through the builder.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Ledger contract, admission control and orchestration.
pub mod core;
/// Configuration models for warm-up, jitter, submission and storage.
pub mod config;
/// Builders to construct the pipeline from configuration.
pub mod builders;
/// Infrastructure adapters for ledgers, candidate sources and submission.
pub mod infra;
/// Status and maintenance API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
