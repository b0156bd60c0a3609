//! netsweep
//!
//! Network-experiment harness that sweeps a grid of emulated network
//! conditions (delay, bandwidth, payload size) and drives an external
//! file-transfer client/server pair through every combination, appending the
//! transmission time or failure reason of each trial to a CSV log.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod payload;
pub mod process;
pub mod shaping;
pub mod sweep;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use executor::{ExecutionConfig, TrialExecutor};
pub use models::{AttemptReport, Config, ResultRecord, SweepGrid, Trial, TrialOutcome};
pub use output::{ResultSink, SummaryFormatter, SweepSummary};
pub use payload::{Materialization, PayloadStore};
pub use process::{ProcessManager, ServerHandle};
pub use shaping::{ShapingApplication, ShapingConfig, ShapingController, ShapingLease};
pub use sweep::{SweepController, SweepPhase};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build provenance stamped by build.rs
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");
pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_DELAYS: &[&str] = &["0ms", "10ms", "50ms", "100ms"];
    pub const DEFAULT_BANDWIDTHS: &[&str] = &["1Mbps", "10Mbps", "100Mbps"];
    pub const DEFAULT_SIZES: &[&str] = &["10K", "100K", "1M"];
    pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";
    pub const DEFAULT_SERVER_PORT: u16 = 5000;
    pub const DEFAULT_RETRIES: u32 = 3;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_RETRY_SLEEP: Duration = Duration::from_millis(2000);
    pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1000);
    pub const DEFAULT_RECLAIM_PAUSE: Duration = Duration::from_millis(500);
    pub const DEFAULT_SERVER_EXIT_GRACE: Duration = Duration::from_secs(10);
    pub const DEFAULT_RESULT_LOG: &str = "results.csv";
    pub const DEFAULT_CLIENT_BIN: &str = "./client";
    pub const DEFAULT_SERVER_BIN: &str = "./server";
    pub const DEFAULT_SERVER_OUTPUT: &str = "received.bin";
    pub const DEFAULT_PAYLOAD_DIR: &str = "payloads";
    pub const DEFAULT_ENABLE_SHAPING: bool = true;
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// Chunk size used when writing payload files
    pub const PAYLOAD_CHUNK: usize = 64 * 1024;

    /// Characters of client output kept in an error column
    pub const ERROR_EXCERPT_CHARS: usize = 200;

    /// Exit code conventionally used by `timeout(1)`
    pub const TIMEOUT_EXIT_CODE: i32 = 124;
}
