//! Client config load/save for `~/.agentchat/config.yaml`, plus the cached
//! session id that lets a restarted client resume its conversation.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Server section (WebSocket url, optional auth token).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Routing section (default provider/model overrides attached to sends).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RoutingSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Full client config.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub routing: RoutingSection,
}

/// Gateway endpoint used when the config does not name one.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8787/ws";

impl Config {
    pub fn server_url(&self) -> &str {
        self.server.url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }
}

/// Returns the default config file path: `~/.agentchat/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".agentchat").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Save config to a YAML file. Creates the parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
    }
    let contents =
        serde_yaml::to_string(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
    std::fs::write(path, contents).map_err(|e| ConfigError::Io(e.to_string()))
}

/// Config load/save error.
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "parse error: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

// ── Session cache ───────────────────────────────────────────────────────
//
// The session id lives in a sibling plain-text file. Every failure here
// degrades silently: losing the cache only means a fresh conversation.

/// Returns the default session cache path: `~/.agentchat/session`.
pub fn default_session_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".agentchat").join("session"))
}

/// Read the cached session id, if one is stored.
pub fn load_session(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let id = contents.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Persist the session id for the next run.
pub fn store_session(path: &Path, session_id: &str) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                debug!("session cache dir not created: {err}");
                return;
            }
        }
    }
    if let Err(err) = std::fs::write(path, session_id) {
        debug!("session cache not written: {err}");
    }
}

/// Forget the cached session id.
pub fn clear_session(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug!("session cache not removed: {err}");
        }
    }
}
