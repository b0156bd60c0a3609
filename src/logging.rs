//! Structured logging system for the sweep harness
//!
//! This module provides:
//! - Structured logging with multiple levels and named loggers
//! - Session and correlation IDs so every line of one sweep can be grouped
//! - Trial and attempt helpers that attach the grid cell as fields
//! - JSON output for `--debug`, human-readable console output otherwise
//!
//! Emission is synchronous so that drop guards (shaping leases, server
//! handles) can log from `Drop`.

use crate::error::{AppError, Result};
use crate::models::{AttemptReport, Config, Trial, TrialOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Severity, ordered so a threshold comparison filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    /// Sweep progress
    Info = 2,
    /// Degraded trials
    Warn = 3,
    /// Failures the sweep continues past
    Error = 4,
    /// Aborts the sweep
    Fatal = 5,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",    // White
            LogLevel::Debug => "\x1b[36m",    // Cyan
            LogLevel::Info => "\x1b[32m",     // Green
            LogLevel::Warn => "\x1b[33m",     // Yellow
            LogLevel::Error => "\x1b[31m",    // Red
            LogLevel::Fatal => "\x1b[35m",    // Magenta
        }
    }

    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// One emitted line before formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Component name, e.g. `SHAPING`
    pub logger: String,
    /// Correlation ID for tracking related events (one per trial)
    pub correlation_id: Option<String>,
    /// Additional structured fields
    pub fields: BTreeMap<String, serde_json::Value>,
    /// File and line information
    pub location: Option<LogLocation>,
}

/// Source code location information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

/// Shared logging context for session tracking
#[derive(Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    context_fields: BTreeMap<String, serde_json::Value>,
}

/// Named logger writing to stderr
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    pub fn new(name: &str) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            include_location: false,
            format: LogFormat::Console,
            name: name.to_string(),
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger with settings derived from the configuration
    pub fn with_config(name: &str, config: &Config) -> Self {
        let min_level = if config.debug || config.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name: name.to_string(),
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Silent logger for tests and library callers that want no output
    pub fn silent(name: &str) -> Self {
        let mut logger = Self::new(name);
        logger.min_level = LogLevel::Fatal;
        logger
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    pub fn set_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    /// Set session correlation ID
    pub fn set_session_id(&self, session_id: &str) {
        if let Ok(mut context) = self.context.write() {
            context.session_id = Some(session_id.to_string());
        }
    }

    /// Add context field for all subsequent log entries
    pub fn add_context_field<T: Serialize>(&self, key: &str, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            if let Ok(mut context) = self.context.write() {
                context.context_fields.insert(key.to_string(), json_value);
            }
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn trace(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    pub fn fatal(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Fatal, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        if let Ok(context) = self.context.read() {
            if let Some(session_id) = &context.session_id {
                entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
            }
            for (key, value) in &context.context_fields {
                entry.fields.insert(key.clone(), value.clone());
            }
        }

        let output = self.render(&entry);

        // Warnings and errors go to stderr, progress to stdout
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", output);
        } else {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }

    fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => self.format_json(entry),
            LogFormat::Compact => self.format_compact(entry),
        }
    }

    /// Format log entry for console output
    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short = correlation_id.get(..8).unwrap_or(correlation_id);
            output.push_str(&format!(" [{}]", short));
        }

        // session_id is noise on the console; it stays in JSON output
        let fields: Vec<String> = entry
            .fields
            .iter()
            .filter(|(k, _)| k.as_str() != "session_id")
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if !fields.is_empty() {
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": {:?}}}", entry.message),
        }
    }

    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Accumulates fields for one entry; `log()` emits it
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: BTreeMap::new(),
                location: None,
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add location information
    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Attach the grid cell of a trial
    pub fn trial(self, trial: &Trial) -> Self {
        self.field("trial", trial.ordinal())
            .field("delay", trial.delay().token())
            .field("bandwidth", trial.bandwidth().token())
            .field("size", trial.size().token())
    }

    /// Attach a classified outcome
    pub fn outcome(self, outcome: &TrialOutcome) -> Self {
        let builder = self.field("outcome", outcome.kind());
        match outcome {
            TrialOutcome::Success { elapsed_ms } => builder.field("elapsed_ms", elapsed_ms),
            TrialOutcome::ProcessError { exit_code, .. } => builder.field("exit_code", exit_code),
            TrialOutcome::Timeout | TrialOutcome::ParseFailure { .. } => builder,
        }
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_fatal", error.is_fatal())
            .field("error_exit_code", error.exit_code())
    }

    pub fn log(self) {
        self.logger.write_entry(self.entry);
    }
}

/// Logger for trial progress and per-attempt events
#[derive(Clone)]
pub struct TrialLogger {
    logger: Logger,
}

impl TrialLogger {
    pub fn new(config: &Config) -> Self {
        Self::from_logger(Logger::with_config("TRIAL", config))
    }

    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Start a trial and hand back its correlation ID
    pub fn trial_started(&self, trial: &Trial, total: usize) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        self.logger
            .info(&format!("Trial {}/{}: {}", trial.ordinal() + 1, total, trial.label()))
            .correlation_id(&correlation_id)
            .trial(trial)
            .log();
        correlation_id
    }

    /// Log a single client attempt; failures at Warn, success at Debug
    pub fn attempt(&self, trial: &Trial, report: &AttemptReport, max_attempts: u32, correlation_id: &str) {
        let level = if report.outcome.is_success() { LogLevel::Debug } else { LogLevel::Warn };
        let message = format!(
            "Attempt {}/{} for {}: {}",
            report.attempt,
            max_attempts,
            trial.label(),
            report.outcome
        );

        self.logger
            .log(level, &message)
            .correlation_id(correlation_id)
            .trial(trial)
            .field("attempt", report.attempt)
            .field("attempt_ms", report.duration.as_millis() as u64)
            .outcome(&report.outcome)
            .log();
    }

    /// Log the outcome that will be persisted for a trial. Failures are
    /// reported as error events, so they are only repeated here at Debug.
    pub fn trial_finished(&self, trial: &Trial, outcome: &TrialOutcome, correlation_id: &str) {
        let level = if outcome.is_success() { LogLevel::Info } else { LogLevel::Debug };
        self.logger
            .log(level, &format!("Recorded {}: {}", trial.label(), outcome))
            .correlation_id(correlation_id)
            .trial(trial)
            .outcome(outcome)
            .log();
    }
}

/// Logs `AppError`s with their category and fatality
#[derive(Clone)]
pub struct ErrorEventLogger {
    logger: Logger,
}

impl ErrorEventLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("ERR", config),
        }
    }

    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    /// Log an application error with full context
    pub fn log_error(&self, error: &AppError, context: Option<&str>, correlation_id: Option<&str>) {
        let message = match context {
            Some(ctx) => format!("{}: {}", ctx, error),
            None => error.to_string(),
        };

        let level = if error.is_fatal() { LogLevel::Error } else { LogLevel::Warn };
        let mut builder = self.logger.log(level, &message).error_info(error);

        if let Some(id) = correlation_id {
            builder = builder.correlation_id(id);
        }

        if let Some(ctx) = context {
            builder = builder.field("context", ctx);
        }

        builder.log();
    }
}

/// Logger factory that stamps one session id on every logger it creates
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a logger with a specific name
    pub fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name, &self.config);
        logger.set_session_id(&self.session_id);
        logger
    }

    pub fn create_trial_logger(&self) -> TrialLogger {
        TrialLogger::from_logger(self.create_logger("TRIAL"))
    }

    pub fn create_error_logger(&self) -> ErrorEventLogger {
        ErrorEventLogger::from_logger(self.create_logger("ERR"))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Convenience macros for logging with location information
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;

    fn sample_trial() -> Trial {
        Trial::new(3, "30ms".parse().unwrap(), "10Mbps".parse().unwrap(), "1M".parse().unwrap())
    }

    fn sample_entry() -> LogEntry {
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), serde_json::Value::String("value".to_string()));
        fields.insert("session_id".to_string(), serde_json::Value::String("s-1".to_string()));
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: "Test message".to_string(),
            logger: "TEST".to_string(),
            correlation_id: Some("0123456789abcdef".to_string()),
            fields,
            location: None,
        }
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[test]
    fn test_logger_with_config() {
        let config = Config {
            debug: true,
            enable_color: false,
            ..Default::default()
        };

        let logger = Logger::with_config("TEST", &config);
        assert_eq!(logger.min_level, LogLevel::Debug);
        assert_eq!(logger.format, LogFormat::Json);
        assert!(!logger.use_color);
        assert!(logger.include_location);

        let quiet = Logger::with_config("TEST", &Config::default());
        assert_eq!(quiet.min_level, LogLevel::Info);
        assert_eq!(quiet.format, LogFormat::Console);
    }

    #[test]
    fn test_would_log() {
        let mut logger = Logger::new("TEST");
        logger.set_level(LogLevel::Warn);

        assert!(!logger.would_log(LogLevel::Debug));
        assert!(!logger.would_log(LogLevel::Info));
        assert!(logger.would_log(LogLevel::Warn));
        assert!(logger.would_log(LogLevel::Fatal));
        assert!(!Logger::silent("TEST").would_log(LogLevel::Error));
    }

    #[test]
    fn test_session_and_context_fields() {
        let logger = Logger::new("TEST");
        logger.set_session_id("test-session");
        logger.add_context_field("interface", "eth0");

        let context = logger.context.read().unwrap();
        assert_eq!(context.session_id.as_deref(), Some("test-session"));
        assert!(context.context_fields.contains_key("interface"));
    }

    #[test]
    fn test_console_format() {
        let mut logger = Logger::new("TEST");
        logger.set_color(false);
        let output = logger.format_console(&sample_entry());

        assert!(output.contains(" INFO [TEST] Test message"));
        assert!(output.contains("[01234567]"));
        assert!(output.contains("key=\"value\""));
        assert!(!output.contains("session_id"));
    }

    #[test]
    fn test_json_and_compact_formats() {
        let logger = Logger::new("TEST");
        let entry = sample_entry();

        let json: serde_json::Value = serde_json::from_str(&logger.format_json(&entry)).unwrap();
        assert_eq!(json["message"], "Test message");
        assert_eq!(json["fields"]["session_id"], "s-1");

        let compact = logger.format_compact(&entry);
        assert!(compact.contains(" I TEST: Test message"));
    }

    #[test]
    fn test_trial_and_outcome_fields() {
        let logger = Logger::new("TEST");
        let builder = logger
            .info("trial")
            .trial(&sample_trial())
            .outcome(&TrialOutcome::ProcessError { exit_code: 7, message: "x".into() });

        let fields = &builder.entry.fields;
        assert_eq!(fields["trial"], 3);
        assert_eq!(fields["delay"], "30ms");
        assert_eq!(fields["bandwidth"], "10Mbps");
        assert_eq!(fields["size"], "1M");
        assert_eq!(fields["outcome"], "process_error");
        assert_eq!(fields["exit_code"], 7);
    }

    #[test]
    fn test_trial_logger_events() {
        let trial_logger = TrialLogger::from_logger(Logger::silent("TRIAL"));
        let trial = sample_trial();

        let correlation_id = trial_logger.trial_started(&trial, 10);
        assert_eq!(correlation_id.len(), 36);

        let report = AttemptReport {
            attempt: 1,
            outcome: TrialOutcome::Timeout,
            duration: Duration::from_millis(250),
        };
        trial_logger.attempt(&trial, &report, 3, &correlation_id);
        trial_logger.trial_finished(&trial, &report.outcome, &correlation_id);
    }

    #[test]
    fn test_logger_factory_shares_session() {
        let factory = LoggerFactory::new(Config::default());
        let a = factory.create_logger("A");
        let b = factory.create_trial_logger();

        let session_a = a.context.read().unwrap().session_id.clone();
        let session_b = b.logger().context.read().unwrap().session_id.clone();
        assert_eq!(session_a.as_deref(), Some(factory.session_id()));
        assert_eq!(session_a, session_b);
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: LogEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.level, LogLevel::Info);
        assert_eq!(deserialized.message, "Test message");
        assert_eq!(deserialized.logger, "TEST");
    }
}
