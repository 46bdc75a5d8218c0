//! Integration tests for config load/save and the session id cache.

use agentchat_client::{config, Config};
use predicates::prelude::*;

#[test]
fn load_existing_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        r#"
server:
  url: "ws://gateway.example.com:8787/ws"
  token: "secret-token"
routing:
  provider: "ollama"
  model: "llama3"
"#,
    )
    .unwrap();

    let cfg = config::load(&config_path).expect("load should succeed");
    assert_eq!(
        cfg.server.url.as_deref(),
        Some("ws://gateway.example.com:8787/ws")
    );
    assert_eq!(cfg.server.token.as_deref(), Some("secret-token"));
    assert_eq!(cfg.routing.provider.as_deref(), Some("ollama"));
    assert_eq!(cfg.routing.model.as_deref(), Some("llama3"));
    assert_eq!(cfg.server_url(), "ws://gateway.example.com:8787/ws");
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(&config_path, "server:\n  token: \"t\"\n").unwrap();

    let cfg = config::load(&config_path).expect("load should succeed");
    assert_eq!(cfg.server_url(), config::DEFAULT_SERVER_URL);
    assert!(cfg.routing.provider.is_none());
}

#[test]
fn save_creates_directory_and_file_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("agentchat");
    let config_path = config_dir.join("config.yaml");
    assert!(!config_dir.exists(), "config dir should not exist yet");

    let mut cfg = Config::default();
    cfg.server.url = Some("ws://127.0.0.1:9000/ws".into());
    cfg.routing.provider = Some("openai".into());

    config::save(&config_path, &cfg).expect("save should succeed");
    let pred = predicates::path::exists();
    assert!(pred.eval(&config_path), "config file should exist after save");
    assert!(config_dir.exists(), "config directory should be created");
}

#[test]
fn round_trip_preserves_schema() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        "server:\n  url: \"ws://127.0.0.1:8787/ws\"\n  token: \"k\"\nrouting:\n  provider: \"ollama\"\n",
    )
    .unwrap();

    let loaded = config::load(&config_path).expect("load should succeed");
    config::save(&config_path, &loaded).expect("save should succeed");

    let contents = std::fs::read_to_string(&config_path).unwrap();
    let pred = predicates::str::contains("server:");
    assert!(pred.eval(&contents), "saved file should contain server section");
    let pred = predicates::str::contains("url");
    assert!(pred.eval(&contents), "saved file should contain url");

    let reloaded = config::load(&config_path).expect("reload should succeed");
    assert_eq!(reloaded.server.url, loaded.server.url);
    assert_eq!(reloaded.server.token, loaded.server.token);
    assert_eq!(reloaded.routing.provider, loaded.routing.provider);
}

/// Config path resolves to `~/.agentchat/config.yaml` under the current
/// platform's home dir. Override HOME to a temp dir to verify.
#[test]
fn default_config_path_uses_home_directory() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().to_str().unwrap().to_string();

    let key = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    let original = std::env::var(key).ok();

    std::env::set_var(key, &home);
    let path = config::default_config_path();
    match original {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    }

    let path = path.expect("should resolve a config path");
    let expected = dir.path().join(".agentchat").join("config.yaml");
    assert_eq!(path, expected);
}

#[test]
fn session_cache_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session");

    assert_eq!(config::load_session(&path), None);

    config::store_session(&path, "s-123");
    assert_eq!(config::load_session(&path).as_deref(), Some("s-123"));

    config::clear_session(&path);
    assert_eq!(config::load_session(&path), None);
    // Clearing an absent cache is a no-op.
    config::clear_session(&path);
}

#[test]
fn blank_session_cache_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session");
    std::fs::write(&path, "  \n").unwrap();
    assert_eq!(config::load_session(&path), None);
}
