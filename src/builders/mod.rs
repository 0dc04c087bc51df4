//! Builders to construct the pipeline from configuration.

pub mod orchestrator_builder;

pub use orchestrator_builder::OrchestratorBuilder;
