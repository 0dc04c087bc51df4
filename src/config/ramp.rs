//! Ramp-up pipeline configuration.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::core::{AdmissionPolicy, AttemptSettings, ConfigError, QuotaSchedule, TimeWindow};
use crate::util::jitter::Jitter;

/// Warm-up gating settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Whether the quota and window apply at all.
    pub enabled: bool,
    /// Daily quota per warm-up day; the last entry repeats.
    pub schedule: Vec<u32>,
    /// First allowed local hour.
    pub start_hour: u32,
    /// Last allowed local hour (inclusive); 24 means end of day.
    pub end_hour: u32,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: vec![50, 100, 200, 400, 800],
            start_hour: 10,
            end_hour: 12,
        }
    }
}

/// Random delay before each submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Lower bound in seconds.
    pub min_secs: u64,
    /// Upper bound in seconds.
    pub max_secs: u64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            min_secs: 30,
            max_secs: 60,
        }
    }
}

/// Receiver endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Scheme, host and port.
    pub base_url: String,
    /// Path appended to `base_url`.
    pub endpoint: String,
    /// Hard timeout per submission in seconds.
    pub timeout_secs: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://core:3000".into(),
            endpoint: "/api/v2/website-profile".into(),
            timeout_secs: 30,
        }
    }
}

/// Directory layout of the file-based candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where queued payload files are picked up.
    pub pending_dir: PathBuf,
    /// Destination of submitted files.
    pub processed_dir: PathBuf,
    /// Destination of unparseable or rejected files.
    pub failed_dir: PathBuf,
    /// File extension of queued payloads, without the dot.
    pub extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pending_dir: PathBuf::from("/app/data/pending"),
            processed_dir: PathBuf::from("/app/data/processed"),
            failed_dir: PathBuf::from("/app/data/failed"),
            extension: "txt".into(),
        }
    }
}

/// Ledger backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum LedgerBackendConfig {
    /// Process-local ledger, lost on restart.
    #[default]
    InMemory,
    /// SQLite database shared by every worker on the host.
    Sqlite {
        /// Database file.
        path: PathBuf,
    },
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    /// Warm-up gating.
    pub warmup: WarmupConfig,
    /// Pre-submission delay.
    pub jitter: JitterConfig,
    /// Receiver endpoint.
    pub submission: SubmissionConfig,
    /// File layout.
    pub storage: StorageConfig,
    /// Ledger backend.
    pub ledger: LedgerBackendConfig,
    /// Retry budget reported to the external trigger; the pipeline itself never retries.
    pub max_retries: u32,
    /// Interval at which the external trigger is expected to tick.
    pub task_interval_secs: u64,
    /// IANA timezone used for windows and day boundaries.
    pub timezone: String,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            warmup: WarmupConfig::default(),
            jitter: JitterConfig::default(),
            submission: SubmissionConfig::default(),
            storage: StorageConfig::default(),
            ledger: LedgerBackendConfig::default(),
            max_retries: 3,
            task_interval_secs: 60,
            timezone: "UTC".into(),
        }
    }
}

impl RampConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        QuotaSchedule::new(self.warmup.schedule.clone())?;
        TimeWindow::new(self.warmup.start_hour, self.warmup.end_hour)?;
        if self.jitter.min_secs > self.jitter.max_secs {
            return Err(ConfigError::Invalid(format!(
                "jitter min_secs ({}) must not exceed max_secs ({})",
                self.jitter.min_secs, self.jitter.max_secs
            )));
        }
        if self.submission.timeout_secs == 0 {
            return Err(ConfigError::Invalid("submission timeout_secs must be greater than 0".into()));
        }
        if self.task_interval_secs == 0 {
            return Err(ConfigError::Invalid("task_interval_secs must be greater than 0".into()));
        }
        if self.submission.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("submission base_url must not be empty".into()));
        }
        self.tz()?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Invalid(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the process environment, reading a `.env` file first when
    /// one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(raw) = var("WARMUP_ENABLED") {
            cfg.warmup.enabled = raw.eq_ignore_ascii_case("true") || raw == "1";
        }
        if let Some(raw) = var("WARMUP_SCHEDULE") {
            cfg.warmup.schedule = QuotaSchedule::parse_list(&raw)
                .map_err(|e| env_error("WARMUP_SCHEDULE", e))?
                .into();
        }
        set_parsed(&var, "WARMUP_START_HOUR", &mut cfg.warmup.start_hour)?;
        set_parsed(&var, "WARMUP_END_HOUR", &mut cfg.warmup.end_hour)?;
        set_parsed(&var, "JITTER_MIN_SECONDS", &mut cfg.jitter.min_secs)?;
        set_parsed(&var, "JITTER_MAX_SECONDS", &mut cfg.jitter.max_secs)?;
        if let Some(url) = var("API_BASE_URL") {
            cfg.submission.base_url = url;
        }
        set_parsed(&var, "API_TIMEOUT_SECONDS", &mut cfg.submission.timeout_secs)?;
        if let Some(dir) = var("PENDING_DIR") {
            cfg.storage.pending_dir = dir.into();
        }
        if let Some(dir) = var("PROCESSED_DIR") {
            cfg.storage.processed_dir = dir.into();
        }
        if let Some(dir) = var("FAILED_DIR") {
            cfg.storage.failed_dir = dir.into();
        }
        if let Some(ext) = var("PENDING_EXTENSION") {
            cfg.storage.extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(path) = var("LEDGER_PATH") {
            cfg.ledger = LedgerBackendConfig::Sqlite { path: path.into() };
        }
        set_parsed(&var, "MAX_RETRIES", &mut cfg.max_retries)?;
        set_parsed(&var, "TASK_INTERVAL_SECONDS", &mut cfg.task_interval_secs)?;
        cfg.timezone = detect_timezone(&var);

        cfg.validate()?;
        Ok(cfg)
    }

    /// Parsed timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid(format!("unknown timezone `{}`: {e}", self.timezone)))
    }

    /// Admission policy for the controller.
    pub fn admission_policy(&self) -> Result<AdmissionPolicy, ConfigError> {
        Ok(AdmissionPolicy {
            enabled: self.warmup.enabled,
            schedule: QuotaSchedule::new(self.warmup.schedule.clone())?,
            window: TimeWindow::new(self.warmup.start_hour, self.warmup.end_hour)?,
        })
    }

    /// Jitter range.
    pub fn jitter_range(&self) -> Jitter {
        Jitter::from_secs(self.jitter.min_secs, self.jitter.max_secs)
    }

    /// Per-submission timeout.
    pub const fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submission.timeout_secs)
    }

    /// Attempt timing for the orchestrator.
    pub fn attempt_settings(&self) -> AttemptSettings {
        AttemptSettings {
            jitter: self.jitter_range(),
            submit_timeout: self.submit_timeout(),
        }
    }
}

fn set_parsed<T, V>(var: &V, name: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: Display,
    V: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(name) {
        *slot = raw.parse().map_err(|e| env_error(name, e))?;
    }
    Ok(())
}

fn env_error(name: &str, err: impl Display) -> ConfigError {
    ConfigError::Env {
        name: name.to_string(),
        message: err.to_string(),
    }
}

/// Resolve the scheduler timezone: `SCHEDULER_TIMEZONE`, then `TZ`, then
/// `/etc/timezone`, then the `/etc/localtime` symlink, then UTC.
fn detect_timezone<V>(var: &V) -> String
where
    V: Fn(&str) -> Option<String>,
{
    if let Some(tz) = var("SCHEDULER_TIMEZONE").or_else(|| var("TZ")) {
        return tz;
    }
    if let Ok(raw) = std::fs::read_to_string("/etc/timezone") {
        let tz = raw.trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }
    if let Ok(link) = std::fs::read_link("/etc/localtime") {
        if let Some((_, zone)) = link.to_string_lossy().split_once("/zoneinfo/") {
            return zone.to_string();
        }
    }
    "UTC".to_string()
}
