use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TunnelError};

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_heartbeat_interval_secs() -> u64 {
    25
}
fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_reconnect_attempts() -> u32 {
    u32::MAX
}

/// Immutable configuration of the edge server (spec.md §3 "Client
/// Options" has a client counterpart below; this is the server side).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub base_domain: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3456,
            base_domain: "localhost".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// The immutable configuration of a tunnel client — spec.md §3 "Client
/// Options": edge host/port, TLS flag, local host/port, requested
/// subdomain, request timeout, maximum reconnect attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub edge_host: String,
    pub edge_port: u16,
    pub secure: bool,
    pub local_host: String,
    pub local_port: u16,
    pub subdomain: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            edge_host: "localhost".to_string(),
            edge_port: 3456,
            secure: false,
            local_host: "127.0.0.1".to_string(),
            local_port: 8080,
            subdomain: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// `ws[s]://{edge_host}:{edge_port}`, without path or query.
    pub fn edge_ws_base_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.edge_host, self.edge_port)
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Load settings of type `T` from an optional TOML file; falls back to
/// `T::default()` when the file does not exist, matching the teacher's
/// `Settings::load` behavior.
pub fn load<T>(config_path: Option<&Path>) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => expand_home("~/.config/reverse-tunnel/config.toml"),
    };

    if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| TunnelError::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| TunnelError::Config(format!("failed to parse config: {e}")))
    } else {
        Ok(T::default())
    }
}
