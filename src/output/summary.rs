//! End-of-sweep summary

use crate::error::{ErrorContext, Result};
use crate::models::{Trial, TrialOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trial that could not run as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat {
    pub subject: String,
    pub reason: String,
}

/// Counters and caveats accumulated over one sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub session_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Trials in the grid
    pub planned: usize,
    /// Trials with a persisted record
    pub completed: usize,
    pub succeeded: usize,
    pub timeouts: usize,
    pub process_errors: usize,
    pub parse_failures: usize,
    pub fastest_ms: Option<u64>,
    pub slowest_ms: Option<u64>,
    /// Trials that ran on the bare link although shaping was enabled
    pub unshaped: Vec<Caveat>,
    /// Payloads that could not be written at their full size
    pub degraded_payloads: Vec<Caveat>,
    pub port_conflicts: usize,
    pub interrupted: bool,
}

impl SweepSummary {
    pub fn new(session_id: &str, planned: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: Some(Utc::now()),
            planned,
            ..Default::default()
        }
    }

    /// Count the persisted outcome of a trial
    pub fn record_outcome(&mut self, outcome: &TrialOutcome) {
        self.completed += 1;
        match outcome {
            TrialOutcome::Success { elapsed_ms } => {
                self.succeeded += 1;
                self.fastest_ms = Some(self.fastest_ms.map_or(*elapsed_ms, |ms| ms.min(*elapsed_ms)));
                self.slowest_ms = Some(self.slowest_ms.map_or(*elapsed_ms, |ms| ms.max(*elapsed_ms)));
            }
            TrialOutcome::Timeout => self.timeouts += 1,
            TrialOutcome::ProcessError { .. } => self.process_errors += 1,
            TrialOutcome::ParseFailure { .. } => self.parse_failures += 1,
        }
    }

    pub fn record_unshaped(&mut self, trial: &Trial, reason: &str) {
        self.unshaped.push(Caveat {
            subject: trial.label(),
            reason: reason.to_string(),
        });
    }

    pub fn record_degraded_payload(&mut self, size: &str, reason: &str) {
        self.degraded_payloads.push(Caveat {
            subject: size.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn record_port_conflict(&mut self) {
        self.port_conflicts += 1;
    }

    pub fn finish(&mut self, interrupted: bool) {
        self.finished_at = Some(Utc::now());
        self.interrupted = interrupted;
    }

    pub fn failed(&self) -> usize {
        self.timeouts + self.process_errors + self.parse_failures
    }

    /// Success rate in percent over completed trials
    pub fn success_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.completed as f64 * 100.0
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Write the summary as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write summary '{}'", path.display()))
    }
}
