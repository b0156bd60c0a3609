//! Configuration data model and validation

use crate::models::trial::SweepGrid;
use crate::types::{parse_token_list, AppError, BandwidthSpec, DelaySpec, Result, SizeSpec};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// One-way delay tokens to sweep
    #[serde(default = "default_delays")]
    pub delays: Vec<String>,

    /// Bandwidth tokens to sweep
    #[serde(default = "default_bandwidths")]
    pub bandwidths: Vec<String>,

    /// Payload size tokens to sweep
    #[serde(default = "default_sizes")]
    pub sizes: Vec<String>,

    /// Address the server binds and the client connects to
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Fixed server port, reclaimed before every trial
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Client attempts per trial
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Wall-clock budget per client attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// Pause between failed attempts
    #[serde(default = "default_retry_sleep_ms")]
    pub retry_sleep_ms: u64,

    /// Pause between trials so sockets fully close
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Pause after reclaiming the port
    #[serde(default = "default_reclaim_pause_ms")]
    pub reclaim_pause_ms: u64,

    /// How long a server may take to exit after a successful client run
    #[serde(default = "default_server_exit_grace_secs")]
    pub server_exit_grace_seconds: u64,

    /// CSV result log
    #[serde(default = "default_result_log")]
    pub result_log: PathBuf,

    /// Interface to shape; detected from the routing table when unset
    #[serde(default)]
    pub network_interface: Option<String>,

    /// Client executable
    #[serde(default = "default_client_bin")]
    pub client_bin: PathBuf,

    /// Server executable
    #[serde(default = "default_server_bin")]
    pub server_bin: PathBuf,

    /// File the server writes the received payload to
    #[serde(default = "default_server_output")]
    pub server_output: PathBuf,

    /// Directory holding generated payload files
    #[serde(default = "default_payload_dir")]
    pub payload_dir: PathBuf,

    /// Apply traffic shaping per trial
    #[serde(default = "default_enable_shaping")]
    pub enable_shaping: bool,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delays: default_delays(),
            bandwidths: default_bandwidths(),
            sizes: default_sizes(),
            server_address: default_server_address(),
            server_port: default_server_port(),
            retries: default_retries(),
            timeout_seconds: default_timeout_secs(),
            retry_sleep_ms: default_retry_sleep_ms(),
            settle_ms: default_settle_ms(),
            reclaim_pause_ms: default_reclaim_pause_ms(),
            server_exit_grace_seconds: default_server_exit_grace_secs(),
            result_log: default_result_log(),
            network_interface: None,
            client_bin: default_client_bin(),
            server_bin: default_server_bin(),
            server_output: default_server_output(),
            payload_dir: default_payload_dir(),
            enable_shaping: default_enable_shaping(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-attempt timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_sleep(&self) -> Duration {
        Duration::from_millis(self.retry_sleep_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reclaim_pause(&self) -> Duration {
        Duration::from_millis(self.reclaim_pause_ms)
    }

    pub fn server_exit_grace(&self) -> Duration {
        Duration::from_secs(self.server_exit_grace_seconds)
    }

    /// First address the server name resolves to. Hostnames go through the
    /// system resolver; `None` when nothing resolves.
    pub fn resolve_server_ip(&self) -> Option<IpAddr> {
        (self.server_address.as_str(), self.server_port)
            .to_socket_addrs()
            .ok()?
            .next()
            .map(|addr| addr.ip())
    }

    /// Parse the three token lists into the sweep grid
    pub fn grid(&self) -> Result<SweepGrid> {
        let delays: Vec<DelaySpec> = parse_token_list("DELAYS", &self.delays.join(","))?;
        let bandwidths: Vec<BandwidthSpec> = parse_token_list("BANDWIDTHS", &self.bandwidths.join(","))?;
        let sizes: Vec<SizeSpec> = parse_token_list("SIZES", &self.sizes.join(","))?;
        Ok(SweepGrid::new(delays, bandwidths, sizes))
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        self.grid()?;

        if self.server_address.is_empty() || self.server_address.contains(char::is_whitespace) {
            return Err(AppError::config(format!(
                "Invalid server address '{}': expected a host name or IP address",
                self.server_address
            )));
        }

        if self.server_port == 0 {
            return Err(AppError::config("Server port must be greater than 0"));
        }

        if self.retries == 0 {
            return Err(AppError::config("Retry count must be greater than 0"));
        }

        if self.retries > 20 {
            return Err(AppError::config("Retry count cannot exceed 20"));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.timeout_seconds > 3600 {
            return Err(AppError::config("Timeout cannot exceed 3600 seconds"));
        }

        if self.result_log.as_os_str().is_empty() {
            return Err(AppError::config("Result log path cannot be empty"));
        }

        if let Some(interface) = &self.network_interface {
            if interface.trim().is_empty() {
                return Err(AppError::config("Network interface cannot be empty"));
            }
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_vars(|key| std::env::var(key).ok())
    }

    /// Merge variables from an arbitrary lookup (environment, tests)
    pub fn merge_from_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DELAYS") {
            self.delays = split_list(&value);
        }

        if let Some(value) = lookup("BANDWIDTHS") {
            self.bandwidths = split_list(&value);
        }

        if let Some(value) = lookup("SIZES") {
            self.sizes = split_list(&value);
        }

        if let Some(value) = lookup("SERVER_ADDRESS") {
            self.server_address = value.trim().to_string();
        }

        if let Some(value) = lookup("SERVER_PORT") {
            self.server_port = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid SERVER_PORT value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("RETRIES") {
            self.retries = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid RETRIES value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("TIMEOUT_SECONDS") {
            self.timeout_seconds = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid TIMEOUT_SECONDS value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("RETRY_SLEEP_MS") {
            self.retry_sleep_ms = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid RETRY_SLEEP_MS value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("SETTLE_MS") {
            self.settle_ms = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid SETTLE_MS value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("RECLAIM_PAUSE_MS") {
            self.reclaim_pause_ms = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid RECLAIM_PAUSE_MS value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("SERVER_EXIT_GRACE_SECONDS") {
            self.server_exit_grace_seconds = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid SERVER_EXIT_GRACE_SECONDS value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("RESULT_LOG") {
            self.result_log = PathBuf::from(value.trim());
        }

        if let Some(value) = lookup("NETWORK_INTERFACE") {
            let value = value.trim();
            self.network_interface = if value.is_empty() { None } else { Some(value.to_string()) };
        }

        if let Some(value) = lookup("CLIENT_BIN") {
            self.client_bin = PathBuf::from(value.trim());
        }

        if let Some(value) = lookup("SERVER_BIN") {
            self.server_bin = PathBuf::from(value.trim());
        }

        if let Some(value) = lookup("SERVER_OUTPUT") {
            self.server_output = PathBuf::from(value.trim());
        }

        if let Some(value) = lookup("PAYLOAD_DIR") {
            self.payload_dir = PathBuf::from(value.trim());
        }

        if let Some(value) = lookup("ENABLE_SHAPING") {
            self.enable_shaping = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid ENABLE_SHAPING value '{}': {}", value, e)))?;
        }

        if let Some(value) = lookup("ENABLE_COLOR") {
            self.enable_color = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
        }

        Ok(())
    }
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Default value functions for serde
fn default_delays() -> Vec<String> {
    crate::defaults::DEFAULT_DELAYS.iter().map(|&s| s.to_string()).collect()
}

fn default_bandwidths() -> Vec<String> {
    crate::defaults::DEFAULT_BANDWIDTHS.iter().map(|&s| s.to_string()).collect()
}

fn default_sizes() -> Vec<String> {
    crate::defaults::DEFAULT_SIZES.iter().map(|&s| s.to_string()).collect()
}

fn default_server_address() -> String {
    crate::defaults::DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_server_port() -> u16 {
    crate::defaults::DEFAULT_SERVER_PORT
}

fn default_retries() -> u32 {
    crate::defaults::DEFAULT_RETRIES
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_retry_sleep_ms() -> u64 {
    crate::defaults::DEFAULT_RETRY_SLEEP.as_millis() as u64
}

fn default_settle_ms() -> u64 {
    crate::defaults::DEFAULT_SETTLE.as_millis() as u64
}

fn default_reclaim_pause_ms() -> u64 {
    crate::defaults::DEFAULT_RECLAIM_PAUSE.as_millis() as u64
}

fn default_server_exit_grace_secs() -> u64 {
    crate::defaults::DEFAULT_SERVER_EXIT_GRACE.as_secs()
}

fn default_result_log() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_RESULT_LOG)
}

fn default_client_bin() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_CLIENT_BIN)
}

fn default_server_bin() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_SERVER_BIN)
}

fn default_server_output() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_SERVER_OUTPUT)
}

fn default_payload_dir() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_PAYLOAD_DIR)
}

fn default_enable_shaping() -> bool {
    crate::defaults::DEFAULT_ENABLE_SHAPING
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
