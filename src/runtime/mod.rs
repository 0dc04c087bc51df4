//! Operator-facing API surface.

pub mod api;

pub use api::{health, reset_history, scheduler_status, Health, ResetReport, SchedulerStatus};
