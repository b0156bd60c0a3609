//! Trial, outcome and result record models

use crate::error::AppError;
use crate::types::{BandwidthSpec, DelaySpec, SizeSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Error column value for a timed-out trial
pub const TIMEOUT_MARKER: &str = "TIMEOUT";

/// Error column prefix for output that lacked a transmission time
pub const PARSE_FAIL_PREFIX: &str = "PARSE_FAIL:";

/// One cell of the sweep grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    ordinal: usize,
    delay: DelaySpec,
    bandwidth: BandwidthSpec,
    size: SizeSpec,
}

impl Trial {
    pub fn new(ordinal: usize, delay: DelaySpec, bandwidth: BandwidthSpec, size: SizeSpec) -> Self {
        Self { ordinal, delay, bandwidth, size }
    }

    /// Zero-based position in the sweep
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn delay(&self) -> &DelaySpec {
        &self.delay
    }

    pub fn bandwidth(&self) -> &BandwidthSpec {
        &self.bandwidth
    }

    pub fn size(&self) -> &SizeSpec {
        &self.size
    }

    /// Short label used in logs, e.g. `30ms/10Mbps/1M`
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.delay, self.bandwidth, self.size)
    }
}

/// Ordered delay × bandwidth × size grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    delays: Vec<DelaySpec>,
    bandwidths: Vec<BandwidthSpec>,
    sizes: Vec<SizeSpec>,
}

impl SweepGrid {
    pub fn new(delays: Vec<DelaySpec>, bandwidths: Vec<BandwidthSpec>, sizes: Vec<SizeSpec>) -> Self {
        Self { delays, bandwidths, sizes }
    }

    pub fn delays(&self) -> &[DelaySpec] {
        &self.delays
    }

    pub fn bandwidths(&self) -> &[BandwidthSpec] {
        &self.bandwidths
    }

    pub fn sizes(&self) -> &[SizeSpec] {
        &self.sizes
    }

    /// Number of trials in the grid
    pub fn len(&self) -> usize {
        self.delays.len() * self.bandwidths.len() * self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Trials in sweep order: delay outermost, size innermost
    pub fn trials(&self) -> impl Iterator<Item = Trial> + '_ {
        self.delays
            .iter()
            .flat_map(move |delay| {
                self.bandwidths.iter().flat_map(move |bandwidth| {
                    self.sizes
                        .iter()
                        .map(move |size| (delay.clone(), bandwidth.clone(), size.clone()))
                })
            })
            .enumerate()
            .map(|(ordinal, (delay, bandwidth, size))| Trial::new(ordinal, delay, bandwidth, size))
    }
}

/// Classified result of one client attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrialOutcome {
    Success { elapsed_ms: u64 },
    Timeout,
    ProcessError { exit_code: i32, message: String },
    ParseFailure { raw_output: String },
}

impl TrialOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short kind name for logs and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Timeout => "timeout",
            Self::ProcessError { .. } => "process_error",
            Self::ParseFailure { .. } => "parse_failure",
        }
    }

    /// Text for the error column; `None` for a success
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::Timeout => Some(TIMEOUT_MARKER.to_string()),
            Self::ProcessError { exit_code, message } => Some(format!("EXIT_{}: {}", exit_code, message)),
            Self::ParseFailure { raw_output } => Some(format!("{} {}", PARSE_FAIL_PREFIX, raw_output)),
        }
    }

    /// The failure as an error event; `None` for a success
    pub fn to_error(&self) -> Option<AppError> {
        match self {
            Self::Success { .. } => None,
            Self::Timeout => Some(AppError::timeout("client attempt exceeded its timeout")),
            Self::ProcessError { exit_code, message } => Some(AppError::process_exit(format!(
                "client exited with code {}: {}",
                exit_code, message
            ))),
            Self::ParseFailure { raw_output } => Some(AppError::output_parse(format!(
                "no transmission time in client output: {}",
                raw_output
            ))),
        }
    }
}

impl fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { elapsed_ms } => write!(f, "success in {} ms", elapsed_ms),
            other => write!(f, "{}", other.error_text().unwrap_or_default()),
        }
    }
}

/// Report for one attempt of a trial; logged, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptReport {
    /// 1-based attempt number
    pub attempt: u32,
    pub outcome: TrialOutcome,
    pub duration: Duration,
}

/// The populated half of a result record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordResult {
    Elapsed(u64),
    Error(String),
}

/// One row of the result log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub delay: String,
    pub bandwidth: String,
    pub size: String,
    result: RecordResult,
}

impl ResultRecord {
    /// Build the persisted record for a trial's final outcome
    pub fn from_outcome(trial: &Trial, outcome: &TrialOutcome) -> Self {
        let result = match outcome {
            TrialOutcome::Success { elapsed_ms } => RecordResult::Elapsed(*elapsed_ms),
            other => RecordResult::Error(other.error_text().unwrap_or_default()),
        };
        Self::new(trial, result)
    }

    fn new(trial: &Trial, result: RecordResult) -> Self {
        Self {
            delay: trial.delay().token().to_string(),
            bandwidth: trial.bandwidth().token().to_string(),
            size: trial.size().token().to_string(),
            result,
        }
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        match self.result {
            RecordResult::Elapsed(ms) => Some(ms),
            RecordResult::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            RecordResult::Elapsed(_) => None,
            RecordResult::Error(message) => Some(message),
        }
    }

    pub fn result(&self) -> &RecordResult {
        &self.result
    }
}
