use risk_guard_cli::build_monitor;
use risk_guard_cli::commands::check_config::{check_risk_configs, ConfigCheck};
use risk_guard_cli::commands::load_config;
use risk_guard_cli::commands::sign::{render, SignArgs};
use risk_guard_core::{ActionResult, AppConfig, ErrorKind};
use risk_guard_lnmarkets::LnMarketsSigner;
use secrecy::SecretString;
use std::path::Path;

const CONFIGS: &str = r#"[
  {"id": "cfg-ok", "user_id": "alice", "enabled": true,
   "threshold_pct": "25", "action": "add_margin", "action_param_pct": "20"},
  {"id": "cfg-off", "user_id": "bob", "enabled": false,
   "threshold_pct": "40", "action": "close_position", "action_param_pct": "0"},
  {"id": "cfg-bad", "user_id": "carol", "enabled": true,
   "threshold_pct": "0", "action": "reduce_position", "action_param_pct": "10"}
]"#;

fn app_config(dir: &Path, configs: &str) -> AppConfig {
    let configs_path = dir.join("risk_configs.json");
    std::fs::write(&configs_path, configs).unwrap();

    let mut config = AppConfig::default();
    config.sources.risk_configs_path = configs_path.display().to_string();
    config.sources.audit_log_path = Some(dir.join("audit.jsonl").display().to_string());
    config.sources.credentials_env_prefix = "RISK_GUARD_CLI_TEST_ABSENT".to_string();
    config
}

// ==================== Config Tests ====================

#[tokio::test]
async fn test_check_risk_configs_counts_each_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = app_config(dir.path(), CONFIGS);

    let check = check_risk_configs(&config).await.unwrap();

    assert_eq!(check.enabled, 1);
    assert_eq!(check.disabled, 1);
    assert_eq!(check.invalid.len(), 1);
    assert!(check.invalid[0].contains("cfg-bad"));
}

#[tokio::test]
async fn test_check_risk_configs_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = app_config(dir.path(), "{ not json");

    assert!(check_risk_configs(&config).await.is_err());
}

#[tokio::test]
async fn test_empty_config_file_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let config = app_config(dir.path(), "[]");

    assert_eq!(check_risk_configs(&config).await.unwrap(), ConfigCheck::default());
}

#[test]
fn test_load_config_reads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("risk-guard.toml");
    std::fs::write(
        &path,
        "[monitor]\ninterval_secs = 5\n\n[monitor.retrigger]\nmode = \"every_tick\"\n",
    )
    .unwrap();

    let config = load_config(&path, None).unwrap();
    assert_eq!(config.monitor.interval_secs, 5);
    assert_eq!(config.monitor.max_concurrency, 4);
}

#[test]
fn test_load_config_rejects_market_ttl_above_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("risk-guard.toml");
    std::fs::write(&path, "[cache]\nmarket_ttl_secs = 60\n").unwrap();

    assert!(load_config(&path, None).is_err());
}

// ==================== Tick Tests ====================

#[tokio::test]
async fn test_tick_records_missing_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let config = app_config(dir.path(), CONFIGS);

    let report = build_monitor(&config).unwrap().run_tick().await.unwrap();

    assert_eq!(report.evaluated, 1);
    assert_eq!(report.errors, 2);
    assert_eq!(report.executed, 0);

    let audit = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
    let records: Vec<ActionResult> = audit
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);

    let kinds: Vec<_> = records
        .iter()
        .map(|r| (r.config_id.as_str(), r.error_kind))
        .collect();
    assert!(kinds.contains(&("cfg-ok", Some(ErrorKind::Credentials))));
    assert!(kinds.contains(&("cfg-bad", Some(ErrorKind::Validation))));
}

#[tokio::test]
async fn test_tick_with_no_configs() {
    let dir = tempfile::tempdir().unwrap();
    let config = app_config(dir.path(), "[]");

    let monitor = build_monitor(&config).unwrap();
    let report = monitor.run_tick().await.unwrap();

    assert_eq!(report.evaluated, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(monitor.health().snapshot().active_config_count, 0);
    assert!(monitor.health().snapshot().last_tick_at.is_some());
}

// ==================== Sign Tests ====================

fn sign_args(method: &str, path: &str, query: &str, body: &str) -> SignArgs {
    SignArgs {
        method: method.to_string(),
        path: path.to_string(),
        query: query.to_string(),
        body: body.to_string(),
        timestamp: Some(1_700_000_000_000),
        api_key: "key-id".to_string(),
        api_secret: "cli-secret".to_string(),
        passphrase: "very-private".to_string(),
    }
}

#[test]
fn test_sign_matches_signer_and_redacts_passphrase() {
    let output = render(&sign_args("GET", "/futures", "type=running", "")).unwrap();

    let expected = LnMarketsSigner::new(
        "key-id",
        SecretString::from("cli-secret".to_string()),
        SecretString::from("very-private".to_string()),
    )
    .unwrap()
    .sign_with_timestamp("GET", "/v2/futures", "type=running", "", 1_700_000_000_000)
    .unwrap();

    assert!(output.contains("payload: 1700000000000GET/v2/futures?type=running"));
    assert!(output.contains(&format!("ACCESS-SIGNATURE: {}", expected.signature)));
    assert!(output.contains("ACCESS-KEY: key-id"));
    assert!(output.contains("ACCESS-TIMESTAMP: 1700000000000"));
    assert!(output.contains("ACCESS-PASSPHRASE: [REDACTED]"));
    assert!(!output.contains("very-private"));
}

#[test]
fn test_sign_rejects_empty_secret() {
    let mut args = sign_args("POST", "/futures/add-margin", "", r#"{"id":"t","amount":1}"#);
    args.api_secret.clear();

    assert!(render(&args).is_err());
}
