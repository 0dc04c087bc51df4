//! Builder assembling an orchestrator from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::{LedgerBackendConfig, RampConfig};
use crate::core::{
    AdmissionController, AppResult, AttemptSettings, AuditLedger, CandidateSource, Collaborators,
    Orchestrator, PayloadReader, SubmissionClient,
};
use crate::infra::{DirectorySource, HttpSubmissionClient, InMemoryLedger, JsonFileReader, SqliteLedger};
use crate::util::clock::{Clock, SystemClock};

/// Wires the configured backends together; any component can be overridden.
pub struct OrchestratorBuilder {
    config: RampConfig,
    clock: Option<Arc<dyn Clock>>,
    ledger: Option<Arc<dyn AuditLedger>>,
    source: Option<Arc<dyn CandidateSource>>,
    reader: Option<Arc<dyn PayloadReader>>,
    client: Option<Arc<dyn SubmissionClient>>,
    settings: Option<AttemptSettings>,
}

impl OrchestratorBuilder {
    /// Start from a configuration.
    pub const fn new(config: RampConfig) -> Self {
        Self {
            config,
            clock: None,
            ledger: None,
            source: None,
            reader: None,
            client: None,
            settings: None,
        }
    }

    /// Use this clock instead of the system clock in the configured timezone.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this ledger instead of the configured backend.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn AuditLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Use this candidate source instead of the configured directories.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Use this payload reader instead of the JSON file reader.
    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn PayloadReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Use this submission client instead of HTTP.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn SubmissionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Override jitter and timeout.
    #[must_use]
    pub fn with_settings(mut self, settings: AttemptSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Validate the configuration and build the orchestrator.
    pub fn build(self) -> AppResult<Orchestrator> {
        let cfg = self.config;
        cfg.validate().context("config invalid")?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new(cfg.tz()?)),
        };

        let ledger: Arc<dyn AuditLedger> = match self.ledger {
            Some(ledger) => ledger,
            None => match &cfg.ledger {
                LedgerBackendConfig::InMemory => Arc::new(InMemoryLedger::new(clock.clone())),
                LedgerBackendConfig::Sqlite { path } => Arc::new(
                    SqliteLedger::open(path, clock.clone())
                        .with_context(|| format!("opening ledger at {}", path.display()))?,
                ),
            },
        };

        let source: Arc<dyn CandidateSource> = match self.source {
            Some(source) => source,
            None => Arc::new(DirectorySource::new(
                cfg.storage.pending_dir.clone(),
                cfg.storage.processed_dir.clone(),
                cfg.storage.failed_dir.clone(),
                cfg.storage.extension.clone(),
            )),
        };

        let reader: Arc<dyn PayloadReader> = self.reader.unwrap_or_else(|| Arc::new(JsonFileReader));

        let client: Arc<dyn SubmissionClient> = match self.client {
            Some(client) => client,
            None => Arc::new(
                HttpSubmissionClient::new(
                    &cfg.submission.base_url,
                    &cfg.submission.endpoint,
                    cfg.submit_timeout(),
                )
                .context("building submission client")?,
            ),
        };

        let admission = AdmissionController::new(cfg.admission_policy()?, ledger.clone(), clock.clone());
        let settings = self.settings.unwrap_or_else(|| cfg.attempt_settings());

        tracing::info!(
            timezone = %clock.timezone(),
            window = %admission.policy().window,
            warmup_enabled = admission.policy().enabled,
            "orchestrator assembled"
        );

        Ok(Orchestrator::new(
            ledger,
            admission,
            Collaborators {
                source,
                reader,
                client,
            },
            clock,
            settings,
        ))
    }
}
