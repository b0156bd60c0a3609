//! Client output classification
//!
//! Pure functions: how an attempt ended plus what it printed becomes a
//! [`TrialOutcome`], and a sequence of attempts reduces to the one outcome
//! that gets persisted.

use crate::defaults::{ERROR_EXCERPT_CHARS, TIMEOUT_EXIT_CODE};
use crate::models::{AttemptReport, TrialOutcome};
use regex::Regex;
use std::sync::OnceLock;

const TRANSMISSION_PATTERN: &str = r"Transmission took\s+(\d+)\s*ms";

/// How a client attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptExit {
    /// Exited normally with a code
    Exited(i32),
    /// Killed by a signal
    Signaled,
    /// Wall-clock budget elapsed
    TimedOut,
}

/// Extract the elapsed milliseconds from `Transmission took <N> ms`
pub fn parse_transmission_time(output: &str) -> Option<u64> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

    PATTERN
        .get_or_init(|| Regex::new(TRANSMISSION_PATTERN).ok())
        .as_ref()?
        .captures(output)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Make text safe for a single CSV field: no line breaks, commas or quotes
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\r' | '\n' | ',' | '"' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitized output cut to the error column length
pub fn excerpt(output: &str) -> String {
    sanitize(output).chars().take(ERROR_EXCERPT_CHARS).collect()
}

/// Classify one attempt from its exit and combined output
pub fn classify_attempt(exit: AttemptExit, output: &str) -> TrialOutcome {
    match exit {
        AttemptExit::TimedOut | AttemptExit::Exited(TIMEOUT_EXIT_CODE) => TrialOutcome::Timeout,
        AttemptExit::Signaled => TrialOutcome::ProcessError {
            exit_code: -1,
            message: excerpt(output),
        },
        AttemptExit::Exited(0) => match parse_transmission_time(output) {
            Some(elapsed_ms) => TrialOutcome::Success { elapsed_ms },
            None => TrialOutcome::ParseFailure {
                raw_output: excerpt(output),
            },
        },
        AttemptExit::Exited(code) => TrialOutcome::ProcessError {
            exit_code: code,
            message: excerpt(output),
        },
    }
}

/// The outcome to persist: the first success, otherwise the last attempt's
/// outcome. `None` only when no attempt ran.
pub fn reduce_attempts(attempts: &[AttemptReport]) -> Option<TrialOutcome> {
    attempts
        .iter()
        .find(|report| report.outcome.is_success())
        .or_else(|| attempts.last())
        .map(|report| report.outcome.clone())
}
