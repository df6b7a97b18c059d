use super::data::{
    Config, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TOKEN_ENV,
};
use super::io::ConfigError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.tool_server.command, "npx");
    assert_eq!(
        config.tool_server.args,
        vec!["-y".to_string(), "@modelcontextprotocol/server-github".to_string()]
    );
    assert_eq!(config.tool_server.token_env, DEFAULT_TOKEN_ENV);
    assert_eq!(
        config.tool_server.request_timeout_secs,
        DEFAULT_REQUEST_TIMEOUT_SECS
    );
    assert!(config.policy.enforce_read_only);
    assert_eq!(config.model.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
}

#[test]
fn test_partial_sections_keep_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[tool_server]
host = "github.bayer.com"

[tool_server.env]
NODE_OPTIONS = "--max-old-space-size=512"

[policy]
allowed_tools = ["get_me"]
blocked_tools = ["search_code"]
"#,
    )
    .expect("write config");

    let config = Config::load_from_path(&config_path).expect("load config");

    assert_eq!(config.tool_server.host, "github.bayer.com");
    assert_eq!(config.tool_server.command, "npx");
    assert_eq!(
        config.tool_server.env.get("NODE_OPTIONS").map(String::as_str),
        Some("--max-old-space-size=512")
    );
    assert!(config.policy.enforce_read_only);
    assert_eq!(config.policy.blocked_tools, vec!["search_code".to_string()]);
    assert_eq!(config.model.model, "gpt-4o");
}

#[test]
fn test_invalid_toml_reports_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[tool_server\ncommand = ").expect("write config");

    let err = Config::load_from_path(&config_path).expect_err("parse should fail");

    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn test_unreadable_path_reports_read_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    // A directory exists but cannot be read as a file.
    let err = Config::load_from_path(temp_dir.path()).expect_err("read should fail");

    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().starts_with("Failed to read config at"));
}

#[test]
fn test_config_persistence_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.model.model = "gpt-4.1-mini".to_string();
    config.policy.allowed_tools.push("get_me".to_string());
    config.save_to_path(&config_path).expect("save config");

    let loaded = Config::load_from_path(&config_path).expect("load config");
    assert_eq!(loaded, config);
}

#[test]
fn test_resolve_path_prefers_explicit() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let explicit = temp_dir.path().join("custom.toml");

    let resolved = Config::resolve_path(Some(&explicit)).expect("resolve");

    assert_eq!(resolved, explicit);
}
