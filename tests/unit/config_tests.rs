use std::path::PathBuf;
use std::time::Duration;

use squadron::{config::GlobalConfig, AppError};

fn full_toml() -> &'static str {
    r#"
leader = "captain"
endpoint = "squadron-test"
worker_program = "/opt/squadron/bin/squadron-worker"
workers = ["alpha", "bravo_2"]
http_port = 0

[supervisor]
crash_loop_floor_seconds = 8
stop_grace_seconds = 2

[reconnect]
max_attempts = 5
reconnect_delay_seconds = 20
check_interval_seconds = 10

[worker]
tick_millis = 250
heartbeat_seconds = 4
spawn_timeout_seconds = 12
liveness_timeout_seconds = 9
command_timeout_seconds = 600
"#
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(full_toml()).expect("valid config");

    assert_eq!(config.leader, "captain");
    assert_eq!(config.endpoint, "squadron-test");
    assert_eq!(
        config.worker_program,
        PathBuf::from("/opt/squadron/bin/squadron-worker")
    );
    assert_eq!(config.workers, vec!["alpha", "bravo_2"]);
    assert_eq!(config.http_port, 0);
    assert_eq!(config.supervisor.crash_loop_floor(), Duration::from_secs(8));
    assert_eq!(config.supervisor.stop_grace(), Duration::from_secs(2));
    assert_eq!(config.reconnect.max_attempts, 5);
    assert_eq!(config.reconnect.reconnect_delay(), Duration::from_secs(20));
    assert_eq!(config.reconnect.check_interval(), Duration::from_secs(10));
    assert_eq!(config.worker.tick(), Duration::from_millis(250));
    assert_eq!(config.worker.heartbeat(), Duration::from_secs(4));
    assert_eq!(config.worker.spawn_timeout(), Duration::from_secs(12));
    assert_eq!(config.worker.liveness_timeout(), Duration::from_secs(9));
    assert_eq!(config.worker.command_timeout(), Some(Duration::from_secs(600)));
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str(r#"leader = "captain""#).expect("valid config");

    assert_eq!(config.endpoint, "squadron");
    assert_eq!(config.worker_program, PathBuf::from("squadron-worker"));
    assert!(config.workers.is_empty());
    assert_eq!(config.http_port, 3100);
    assert_eq!(config.supervisor.crash_loop_floor(), Duration::from_secs(5));
    assert_eq!(config.supervisor.stop_grace(), Duration::from_secs(3));
    assert_eq!(config.reconnect.max_attempts, 3);
    assert_eq!(config.reconnect.reconnect_delay(), Duration::from_secs(15));
    assert_eq!(config.reconnect.check_interval(), Duration::from_secs(15));
    assert_eq!(config.worker.tick(), Duration::from_millis(300));
    assert_eq!(config.worker.heartbeat(), Duration::from_secs(5));
    assert_eq!(config.worker.spawn_timeout(), Duration::from_secs(30));
    assert_eq!(config.worker.command_timeout(), None);
}

#[test]
fn zero_command_timeout_means_none() {
    let toml = r#"
leader = "captain"

[worker]
command_timeout_seconds = 0
"#;
    let config = GlobalConfig::from_toml_str(toml).expect("valid config");
    assert_eq!(config.worker.command_timeout(), None);
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("squadron.toml");
    std::fs::write(&path, full_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load config");
    assert_eq!(config.leader, "captain");
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn missing_leader_is_rejected() {
    let result = GlobalConfig::from_toml_str(r#"workers = ["alpha"]"#);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn malformed_toml_is_rejected() {
    let result = GlobalConfig::from_toml_str("leader = ");
    let err = result.expect_err("must fail");
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn invalid_leader_name_is_rejected() {
    let result = GlobalConfig::from_toml_str(r#"leader = "no""#);
    let err = result.expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("leader name invalid"));
}

#[test]
fn invalid_worker_name_is_rejected() {
    let toml = r#"
leader = "captain"
workers = ["alpha", "has space"]
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must fail");
    assert!(err.to_string().contains("worker name invalid"));
}

#[test]
fn duplicate_worker_is_rejected() {
    let toml = r#"
leader = "captain"
workers = ["alpha", "alpha"]
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must fail");
    assert_eq!(err.to_string(), "config: duplicate agent name: alpha");
}

#[test]
fn worker_sharing_leader_name_is_rejected() {
    let toml = r#"
leader = "captain"
workers = ["captain"]
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must fail");
    assert_eq!(err.to_string(), "config: duplicate agent name: captain");
}

#[test]
fn empty_endpoint_is_rejected() {
    let toml = r#"
leader = "captain"
endpoint = "  "
"#;
    assert!(GlobalConfig::from_toml_str(toml).is_err());
}

#[test]
fn zero_max_attempts_is_rejected() {
    let toml = r#"
leader = "captain"

[reconnect]
max_attempts = 0
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("must fail");
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
fn zero_check_interval_is_rejected() {
    let toml = r#"
leader = "captain"

[reconnect]
check_interval_seconds = 0
"#;
    assert!(GlobalConfig::from_toml_str(toml).is_err());
}

#[test]
fn zero_tick_is_rejected() {
    let toml = r#"
leader = "captain"

[worker]
tick_millis = 0
"#;
    assert!(GlobalConfig::from_toml_str(toml).is_err());
}
