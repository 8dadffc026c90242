//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_ADDR;

/// Project-local config file name
const LOCAL_CONFIG: &str = ".signalcoord.yml";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Coordinator (server) settings
    pub coordinator: CoordinatorConfig,

    /// Signal unit (client) settings
    pub unit: UnitConfig,

    /// Demo launcher settings
    pub demo: DemoConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.signalcoord.yml`, then
    /// `~/.config/signalcoord/signalcoord.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Any failure yields `None`; the full [`Config::load`] reports it later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => Self::default_paths().into_iter().find(|p| p.exists())?,
        };
        Self::load_from_file(&path).ok()?.log_level
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("signalcoord").join("signalcoord.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Address to listen on
    pub bind: String,

    /// Delay between registry checks in milliseconds
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// How long to wait for each acknowledgment, 0 waits forever
    #[serde(rename = "ack-timeout-ms")]
    pub ack_timeout_ms: u64,

    /// Register peers that close before announcing, as "unknown"
    #[serde(rename = "accept-anonymous")]
    pub accept_anonymous: bool,

    /// Inbound messages buffered per unit between cycles
    #[serde(rename = "inbound-buffer")]
    pub inbound_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_ADDR.to_string(),
            poll_interval_ms: 2000,
            ack_timeout_ms: 5000,
            accept_anonymous: false,
            inbound_buffer: 16,
        }
    }
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        (self.ack_timeout_ms > 0).then(|| Duration::from_millis(self.ack_timeout_ms))
    }
}

/// Signal unit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Coordinator address to connect to
    pub server: String,

    /// Connect timeout in milliseconds
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_ADDR.to_string(),
            connect_timeout_ms: 5000,
        }
    }
}

impl UnitConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Demo launcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Total run time before every process is stopped
    #[serde(rename = "duration-secs")]
    pub duration_secs: u64,

    /// Delay between starting the coordinator and the units
    #[serde(rename = "startup-delay-ms")]
    pub startup_delay_ms: u64,

    /// Identifiers of the units to launch
    pub units: Vec<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            duration_secs: 30,
            startup_delay_ms: 1000,
            units: vec!["main-avenue".to_string(), "side-street".to_string()],
        }
    }
}
