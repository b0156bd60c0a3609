//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::Result,
    models::{config::split_list, Config},
};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        // .env values never override variables already in the environment
        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    pub fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(delays) = &cli.delays {
            config.delays = split_list(delays);
        }
        if let Some(bandwidths) = &cli.bandwidths {
            config.bandwidths = split_list(bandwidths);
        }
        if let Some(sizes) = &cli.sizes {
            config.sizes = split_list(sizes);
        }

        if let Some(address) = &cli.server_address {
            config.server_address = address.trim().to_string();
        }
        if let Some(port) = cli.port {
            config.server_port = port;
        }
        if let Some(retries) = cli.retries {
            config.retries = retries;
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
        }
        if let Some(ms) = cli.retry_sleep_ms {
            config.retry_sleep_ms = ms;
        }
        if let Some(ms) = cli.settle_ms {
            config.settle_ms = ms;
        }
        if let Some(ms) = cli.reclaim_pause_ms {
            config.reclaim_pause_ms = ms;
        }
        if let Some(secs) = cli.server_exit_grace {
            config.server_exit_grace_seconds = secs;
        }

        if let Some(path) = &cli.result_log {
            config.result_log = path.clone();
        }
        if let Some(interface) = &cli.interface {
            config.network_interface = Some(interface.clone());
        }
        if let Some(path) = &cli.client {
            config.client_bin = path.clone();
        }
        if let Some(path) = &cli.server {
            config.server_bin = path.clone();
        }
        if let Some(path) = &cli.server_output {
            config.server_output = path.clone();
        }
        if let Some(path) = &cli.payload_dir {
            config.payload_dir = path.clone();
        }

        if cli.no_shaping {
            config.enable_shaping = false;
        }
        if cli.no_color {
            config.enable_color = false;
        }

        // CLI-only flags
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            println!("Applied CLI overrides to configuration");
            println!(
                "Final config: retries={}, timeout={}s, shaping={}",
                config.retries, config.timeout_seconds, config.enable_shaping
            );
        }
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Delays: {}", config.delays.join(", ")));
    summary.push(format!("Bandwidths: {}", config.bandwidths.join(", ")));
    summary.push(format!("Sizes: {}", config.sizes.join(", ")));
    summary.push(format!("Server: {}:{}", config.server_address, config.server_port));
    summary.push(format!("Retries: {}", config.retries));
    summary.push(format!("Timeout: {}s", config.timeout_seconds));
    summary.push(format!("Result Log: {}", config.result_log.display()));
    summary.push(format!(
        "Interface: {}",
        config.network_interface.as_deref().unwrap_or("(auto)")
    ));
    summary.push(format!("Shaping: {}", config.enable_shaping));
    summary.push(format!("Color Output: {}", config.enable_color));

    summary.join("\n")
}
