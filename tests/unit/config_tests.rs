use std::time::Duration;

use acp_turn_agent::config::TurnConfig;
use acp_turn_agent::{AppError, GlobalConfig};

fn sample_toml(workspace: &str) -> String {
    format!(
        r#"
[backend]
host_cli = "claude"
workspace_root = '{workspace}'

[turn]
max_tokens = 20000
max_turn_requests = 8
strict_protocol = true
"#
    )
}

#[test]
fn parses_valid_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = sample_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");

    assert_eq!(config.backend.host_cli, "claude");
    assert!(config.backend.host_cli_args.contains(&"stream-json".to_owned()));
    assert!(config.backend.stderr_log);
    assert_eq!(config.turn.max_tokens, Some(20_000));
    assert_eq!(config.turn.max_turn_requests, Some(8));
    assert!(config.turn.strict_protocol);
    assert_eq!(config.turn.refusal_short_text_threshold, 200);
    assert_eq!(config.turn.cancel_drain_timeout(), Duration::from_millis(2000));

    let canonical = temp.path().canonicalize().expect("canonicalize");
    assert_eq!(config.workspace_root(), canonical.as_path());
}

#[test]
fn turn_table_is_optional() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "[backend]\nhost_cli = \"claude\"\nworkspace_root = '{}'\n",
        temp.path().to_str().expect("utf8 path")
    );

    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");

    assert_eq!(config.turn, TurnConfig::default());
    assert_eq!(config.turn.max_tokens, None);
    assert_eq!(config.turn.max_turn_requests, None);
}

#[test]
fn zero_limits_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "[backend]\nhost_cli = \"claude\"\nworkspace_root = '{}'\n[turn]\nmax_turn_requests = 0\n",
        temp.path().to_str().expect("utf8 path")
    );

    let err = GlobalConfig::from_toml_str(&toml).expect_err("zero limit");

    assert!(matches!(err, AppError::Config(msg) if msg.contains("max_turn_requests")));
}

#[test]
fn empty_host_cli_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "[backend]\nhost_cli = \"  \"\nworkspace_root = '{}'\n",
        temp.path().to_str().expect("utf8 path")
    );

    assert!(matches!(
        GlobalConfig::from_toml_str(&toml),
        Err(AppError::Config(_))
    ));
}

#[test]
fn missing_workspace_is_rejected() {
    let toml = "[backend]\nhost_cli = \"claude\"\nworkspace_root = '/definitely/not/here/acp'\n";

    let err = GlobalConfig::from_toml_str(toml).expect_err("missing workspace");

    assert!(matches!(err, AppError::Config(msg) if msg.contains("workspace_root")));
}

#[test]
fn invalid_toml_maps_to_config_error() {
    assert!(matches!(
        GlobalConfig::from_toml_str("[backend"),
        Err(AppError::Config(_))
    ));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, sample_toml(temp.path().to_str().expect("utf8 path")))
        .expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");

    assert_eq!(config.turn.max_turn_requests, Some(8));
}
