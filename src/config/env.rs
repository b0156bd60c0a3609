//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::models::Config;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists. Variables already set in the process
    /// environment keep their values.
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;

            if debug {
                println!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            println!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# netsweep configuration
#
# Values here are used unless the same variable is set in the environment
# or overridden on the command line.

# Sweep grid (comma-separated tokens)
# DELAYS=0ms,10ms,50ms,100ms
# BANDWIDTHS=1Mbps,10Mbps,100Mbps
# SIZES=10K,100K,1M

# Server endpoint
# SERVER_ADDRESS=127.0.0.1
# SERVER_PORT=5000

# Client attempts per trial (1-20) and per-attempt timeout in seconds (1-3600)
# RETRIES=3
# TIMEOUT_SECONDS=60

# Pauses in milliseconds
# RETRY_SLEEP_MS=2000
# SETTLE_MS=1000
# RECLAIM_PAUSE_MS=500

# Seconds the server may take to exit after a successful transfer
# SERVER_EXIT_GRACE_SECONDS=10

# Output and executables
# RESULT_LOG=results.csv
# CLIENT_BIN=./client
# SERVER_BIN=./server
# SERVER_OUTPUT=received.bin
# PAYLOAD_DIR=payloads

# Interface to shape; leave unset to detect it from the routing table
# NETWORK_INTERFACE=eth0

# ENABLE_SHAPING=true
# ENABLE_COLOR=true
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }

    /// Validate one environment variable in isolation
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        if !Self::get_supported_env_vars().iter().any(|(name, _, _)| *name == key) {
            // Unknown environment variable, ignore
            return Ok(());
        }

        let mut config = Config::default();
        config.merge_from_vars(|k| (k == key).then(|| value.to_string()))?;
        config
            .validate()
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("DELAYS", "Comma-separated one-way delays", "0ms,30ms,100ms"),
            ("BANDWIDTHS", "Comma-separated link rates", "1Mbps,500Kbps"),
            ("SIZES", "Comma-separated payload sizes (<n>K or <n>M)", "10K,1M"),
            ("SERVER_ADDRESS", "Server bind/connect address", "127.0.0.1"),
            ("SERVER_PORT", "Fixed server port", "5000"),
            ("RETRIES", "Client attempts per trial (1-20)", "3"),
            ("TIMEOUT_SECONDS", "Per-attempt timeout in seconds (1-3600)", "60"),
            ("RETRY_SLEEP_MS", "Pause between failed attempts", "2000"),
            ("SETTLE_MS", "Pause between trials", "1000"),
            ("RECLAIM_PAUSE_MS", "Pause after reclaiming the port", "500"),
            ("SERVER_EXIT_GRACE_SECONDS", "Server exit grace after success", "10"),
            ("RESULT_LOG", "CSV result log path", "results.csv"),
            ("NETWORK_INTERFACE", "Interface to shape (auto-detected if unset)", "eth0"),
            ("CLIENT_BIN", "Client executable", "./client"),
            ("SERVER_BIN", "Server executable", "./server"),
            ("SERVER_OUTPUT", "File the server writes", "received.bin"),
            ("PAYLOAD_DIR", "Directory for payload files", "payloads"),
            ("ENABLE_SHAPING", "Apply traffic shaping", "true"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<26} {}\n", var, description));
            help.push_str(&format!("  {:<26} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate the entries of a .env file, one warning per bad line
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let warnings = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value.trim())
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect();

        Ok(Some(warnings))
    }
}
