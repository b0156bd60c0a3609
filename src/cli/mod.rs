//! Command-line interface
//!
//! Every sweep setting is optional here so that an unset flag leaves the
//! environment or `.env` value in place.

use clap::Parser;
use std::path::PathBuf;

/// netsweep - sweep emulated network conditions through a file-transfer client/server pair
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "netsweep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// One-way delays to sweep (comma-separated, e.g. "0ms,30ms")
    #[arg(long, value_name = "LIST")]
    pub delays: Option<String>,

    /// Bandwidths to sweep (comma-separated, e.g. "1Mbps,500Kbps")
    #[arg(long, value_name = "LIST")]
    pub bandwidths: Option<String>,

    /// Payload sizes to sweep (comma-separated, e.g. "10K,1M")
    #[arg(long, value_name = "LIST")]
    pub sizes: Option<String>,

    /// Address the server binds and the client connects to
    #[arg(long, value_name = "ADDR")]
    pub server_address: Option<String>,

    /// Fixed server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Client attempts per trial (1-20)
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Per-attempt timeout in seconds (1-3600)
    #[arg(short, long, value_parser = parse_duration, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Pause between failed attempts in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_sleep_ms: Option<u64>,

    /// Pause between trials in milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Pause after reclaiming the server port in milliseconds
    #[arg(long, value_name = "MS")]
    pub reclaim_pause_ms: Option<u64>,

    /// Seconds a server may take to exit after a successful transfer
    #[arg(long, value_name = "SECONDS")]
    pub server_exit_grace: Option<u64>,

    /// CSV result log
    #[arg(short = 'o', long, value_name = "PATH")]
    pub result_log: Option<PathBuf>,

    /// Interface to shape (auto-detected when omitted)
    #[arg(short, long, value_name = "IFACE")]
    pub interface: Option<String>,

    /// Client executable
    #[arg(long, value_name = "PATH")]
    pub client: Option<PathBuf>,

    /// Server executable
    #[arg(long, value_name = "PATH")]
    pub server: Option<PathBuf>,

    /// File the server writes the received payload to
    #[arg(long, value_name = "PATH")]
    pub server_output: Option<PathBuf>,

    /// Directory for generated payload files
    #[arg(long, value_name = "DIR")]
    pub payload_dir: Option<PathBuf>,

    /// Run every trial on the bare link
    #[arg(long)]
    pub no_shaping: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output (JSON logs with source locations)
    #[arg(long)]
    pub debug: bool,

    /// Print the trial grid with derived shaping parameters and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the sweep summary as JSON
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,

    /// Write an example .env file and exit
    #[arg(long, value_name = "PATH")]
    pub init_env: Option<PathBuf>,
}

impl Cli {
    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

/// Parse timeout seconds
fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 3600 {
                Err("Duration cannot exceed 3600 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
pub fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_defaults_are_unset() {
        let cli = Cli::parse_from(["netsweep"]);
        assert!(cli.delays.is_none());
        assert!(cli.port.is_none());
        assert!(cli.timeout.is_none());
        assert!(!cli.no_shaping);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_parsing_all_options() {
        let cli = Cli::parse_from([
            "netsweep",
            "--delays", "0ms,30ms",
            "--bandwidths", "1Mbps",
            "--sizes", "10K",
            "--server-address", "10.0.0.2",
            "--port", "6000",
            "--retries", "5",
            "--timeout", "30",
            "--retry-sleep-ms", "100",
            "--settle-ms", "50",
            "--reclaim-pause-ms", "20",
            "--server-exit-grace", "4",
            "--result-log", "out.csv",
            "--interface", "eth1",
            "--client", "/opt/client",
            "--server", "/opt/server",
            "--server-output", "/tmp/rx.bin",
            "--payload-dir", "/tmp/payloads",
            "--no-shaping",
            "--no-color",
            "--verbose",
            "--debug",
            "--dry-run",
            "--summary-json", "summary.json",
        ]);

        assert_eq!(cli.delays.as_deref(), Some("0ms,30ms"));
        assert_eq!(cli.port, Some(6000));
        assert_eq!(cli.retries, Some(5));
        assert_eq!(cli.timeout, Some(30));
        assert_eq!(cli.server_exit_grace, Some(4));
        assert_eq!(cli.result_log, Some(PathBuf::from("out.csv")));
        assert_eq!(cli.interface.as_deref(), Some("eth1"));
        assert!(cli.no_shaping);
        assert!(cli.no_color);
        assert!(!cli.use_colors());
        assert!(cli.dry_run);
        assert_eq!(cli.summary_json, Some(PathBuf::from("summary.json")));
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("1").unwrap(), 1);
        assert_eq!(parse_duration("3600").unwrap(), 3600);

        assert!(parse_duration("0").is_err());
        assert!(parse_duration("3601").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-5").is_err());
        assert!(parse_duration("+5").is_err());
    }

    #[test]
    fn test_invalid_timeout_rejected_by_clap() {
        assert!(Cli::try_parse_from(["netsweep", "--timeout", "0"]).is_err());
        assert!(Cli::try_parse_from(["netsweep", "--port", "70000"]).is_err());
    }
}
