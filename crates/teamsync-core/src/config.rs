//! Node configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default port for the node's HTTP/WebSocket surface
pub const DEFAULT_PORT: u16 = 19960;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Node configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory holding all persisted state (default: ~/.teamsync)
    pub data_dir: PathBuf,
    /// Bind host (default: 0.0.0.0)
    pub host: String,
    /// HTTP port, also advertised to peers (default: 19960)
    pub port: u16,
    /// Advertise led teams over mDNS (default: true)
    pub discovery: bool,
    /// Where team skills are installed (default: {data_dir}/skills)
    pub skills_dir: PathBuf,
    /// Timeout for join/leave/member calls to the leader
    pub membership_timeout: Duration,
    /// Timeout for collaboration writes forwarded to the leader
    pub forward_timeout: Duration,
    /// Timeout for a full skill archive download
    pub download_timeout: Duration,
    /// How long a discovery browse collects answers
    pub discovery_timeout: Duration,
    /// Ping interval on presence channels
    pub heartbeat_interval: Duration,
    /// Silence after which a presence channel is considered dead
    pub heartbeat_timeout: Duration,
    /// First presence reconnect delay
    pub reconnect_min: Duration,
    /// Cap on presence reconnect delay
    pub reconnect_max: Duration,
}

impl Config {
    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            skills_dir: data_dir.join("skills"),
            data_dir,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            discovery: true,
            membership_timeout: Duration::from_secs(10),
            forward_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(300),
            discovery_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }

    /// Load configuration from `TEAMSYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env::var("TEAMSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());
        let mut config = Self::with_data_dir(data_dir);

        if let Ok(host) = env::var("TEAMSYNC_HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("TEAMSYNC_PORT") {
            config.port = parse_port("TEAMSYNC_PORT", &port)?;
        }
        if let Ok(flag) = env::var("TEAMSYNC_DISCOVERY") {
            config.discovery = parse_flag("TEAMSYNC_DISCOVERY", &flag)?;
        }
        if let Ok(dir) = env::var("TEAMSYNC_SKILLS_DIR") {
            config.skills_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Override the data directory, keeping a default skills dir in sync.
    pub fn set_data_dir(&mut self, data_dir: impl Into<PathBuf>) {
        let data_dir = data_dir.into();
        if self.skills_dir == self.data_dir.join("skills") {
            self.skills_dir = data_dir.join("skills");
        }
        self.data_dir = data_dir;
    }

    /// Directory for JSONL log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Default data directory (~/.teamsync)
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".teamsync")
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
