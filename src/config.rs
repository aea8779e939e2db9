// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Daemon settings and the Home Assistant connection live in TOML.
//! Default path: `/etc/curve-scheduler/config.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/curve-scheduler/config.toml";

/// Default daemon socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/run/curve-scheduler.sock";

/// Default scheduler store location.
pub const DEFAULT_STORE_PATH: &str = "/var/lib/curve-scheduler/schedulers.json";

/// Default Home Assistant base URL.
pub const DEFAULT_HASS_URL: &str = "http://localhost:8123";

/// Default interval between state polls, in milliseconds.
pub const DEFAULT_STATE_POLL_MS: u64 = 2000;

/// Default HTTP request timeout, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Environment variable consulted when no token is configured.
pub const TOKEN_ENV_VAR: &str = "HASS_TOKEN";

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Home Assistant connection.
    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path for the Unix domain socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Where scheduler definitions are persisted.
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            store_path: DEFAULT_STORE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`.
    #[serde(default = "default_hass_url")]
    pub url: String,

    /// Long-lived access token. Falls back to `$HASS_TOKEN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// How often entity states are polled for changes.
    #[serde(default = "default_state_poll")]
    pub state_poll_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_HASS_URL.to_string(),
            token: None,
            state_poll_ms: DEFAULT_STATE_POLL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl HomeAssistantConfig {
    /// Token from the file, or from the environment when the file has none.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty()))
    }
}

// ---------------------------------------------------------------------------
// Load / Save
// ---------------------------------------------------------------------------

/// Load config from a TOML file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> io::Result<Config> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config = parse_config(&contents)?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse config from TOML text.
pub fn parse_config(contents: &str) -> io::Result<Config> {
    toml::from_str(contents).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse config: {e}"),
        )
    })
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_store_path() -> String {
    DEFAULT_STORE_PATH.to_string()
}

fn default_hass_url() -> String {
    DEFAULT_HASS_URL.to_string()
}

fn default_state_poll() -> u64 {
    DEFAULT_STATE_POLL_MS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.daemon.socket_path, DEFAULT_SOCKET_PATH);
        assert_eq!(cfg.daemon.store_path, DEFAULT_STORE_PATH);
        assert_eq!(cfg.home_assistant.url, DEFAULT_HASS_URL);
        assert_eq!(cfg.home_assistant.state_poll_ms, DEFAULT_STATE_POLL_MS);
        assert!(cfg.home_assistant.token.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = parse_config(
            r#"
            [daemon]
            socket_path = "/tmp/sched.sock"

            [home_assistant]
            url = "http://ha.lan:8123"
            token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.daemon.socket_path, "/tmp/sched.sock");
        assert_eq!(cfg.daemon.store_path, DEFAULT_STORE_PATH);
        assert_eq!(cfg.home_assistant.url, "http://ha.lan:8123");
        assert_eq!(cfg.home_assistant.resolve_token().as_deref(), Some("abc"));
        assert_eq!(cfg.home_assistant.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_bad_toml_is_invalid_data() {
        let err = parse_config("[daemon\nsocket_path = 1").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("curve-scheduler-cfg-{}", std::process::id()));
        let path = dir.join("config.toml");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "[home_assistant]\nstate_poll_ms = 500\n").unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.home_assistant.state_poll_ms, 500);
        assert_eq!(loaded.daemon.socket_path, DEFAULT_SOCKET_PATH);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_is_default() {
        let cfg = load_config(Path::new("/nonexistent/curve-scheduler.toml")).unwrap();
        assert_eq!(cfg.home_assistant.url, DEFAULT_HASS_URL);
    }

    #[test]
    fn test_resolve_config_path() {
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(resolve_config_path(Some("/tmp/x.toml")), PathBuf::from("/tmp/x.toml"));
    }
}
