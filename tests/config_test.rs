//! Tests for configuration parsing and orchestrator assembly

use prometheus_ramp::builders::OrchestratorBuilder;
use prometheus_ramp::config::{LedgerBackendConfig, RampConfig};
use prometheus_ramp::core::{AuditLedger, ConfigError};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_empty_json_yields_defaults() {
    let cfg = RampConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, RampConfig::default());
    assert!(cfg.warmup.enabled);
    assert_eq!(cfg.warmup.schedule, [50, 100, 200, 400, 800]);
    assert_eq!((cfg.warmup.start_hour, cfg.warmup.end_hour), (10, 12));
    assert_eq!(cfg.submission.base_url, "http://core:3000");
    assert_eq!(cfg.submission.endpoint, "/api/v2/website-profile");
    assert_eq!(cfg.submit_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.storage.extension, "txt");
    assert_eq!(cfg.ledger, LedgerBackendConfig::InMemory);
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.task_interval_secs, 60);
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let cfg = RampConfig::from_json_str(
        r#"{
            "warmup": { "schedule": [5, 10], "start_hour": 22, "end_hour": 2 },
            "ledger": { "backend": "sqlite", "path": "/var/lib/ramp/ledger.db" },
            "timezone": "Asia/Tehran"
        }"#,
    )
    .unwrap();
    assert!(cfg.warmup.enabled);
    assert_eq!(cfg.jitter.min_secs, 30);
    assert_eq!(
        cfg.ledger,
        LedgerBackendConfig::Sqlite {
            path: PathBuf::from("/var/lib/ramp/ledger.db")
        }
    );
    let policy = cfg.admission_policy().unwrap();
    assert!(policy.window.contains_hour(23));
    assert!(policy.window.contains_hour(2));
    assert!(!policy.window.contains_hour(3));
    assert_eq!(cfg.tz().unwrap(), chrono_tz::Asia::Tehran);
}

#[test]
fn test_invalid_documents_are_rejected() {
    let cases = [
        r#"{"warmup": {"schedule": []}}"#,
        r#"{"warmup": {"schedule": [10, 0]}}"#,
        r#"{"warmup": {"start_hour": 24}}"#,
        r#"{"jitter": {"min_secs": 10, "max_secs": 5}}"#,
        r#"{"submission": {"timeout_secs": 0}}"#,
        r#"{"task_interval_secs": 0}"#,
        r#"{"timezone": "Nowhere/City"}"#,
        r#"{"ledger": {"backend": "postgres"}}"#,
        "not json",
    ];
    for case in cases {
        let err = RampConfig::from_json_str(case).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{case} gave {err:?}");
    }
}

#[test]
fn test_builder_rejects_invalid_config() {
    let mut cfg = RampConfig::default();
    cfg.warmup.schedule.clear();
    let err = OrchestratorBuilder::new(cfg).build().err().unwrap();
    assert!(err.to_string().contains("config invalid"));
}

#[tokio::test]
async fn test_builder_defaults_to_in_memory_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = RampConfig::default();
    cfg.warmup.enabled = false;
    cfg.storage.pending_dir = dir.path().join("pending");
    let orchestrator = OrchestratorBuilder::new(cfg).build().unwrap();

    assert_eq!(orchestrator.ledger().aggregate_stats().unwrap().total, 0);
    assert!(orchestrator.pending().unwrap().is_empty());
    assert_eq!(orchestrator.settings().submit_timeout, Duration::from_secs(30));
}
