//! Error handling for the sweep harness
//!
//! Only configuration errors abort a sweep. Every per-trial error is
//! classified, logged and recorded, and the sweep moves on to the next cell.

use thiserror::Error;

/// Custom error types for the sweep harness
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Missing or invalid executable, interface, token or setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// Neither the preferred tool nor the tc fallback could apply shaping
    #[error("Shaping error: {0}")]
    ShapingApplication(String),

    /// The fixed server port was still bound when a trial wanted it
    #[error("Port conflict: {0}")]
    PortConflict(String),

    /// An external process exited unsuccessfully or could not be started
    #[error("Process exit error: {0}")]
    ProcessExit(String),

    /// A client attempt exceeded its wall-clock budget
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Client output did not contain a transmission time
    #[error("Output parse error: {0}")]
    OutputParse(String),

    /// I/O errors (result log, payload files, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (tokens, numbers, addresses)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// The sweep was interrupted by a signal
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new shaping application error
    pub fn shaping<S: Into<String>>(message: S) -> Self {
        Self::ShapingApplication(message.into())
    }

    /// Create a new port conflict error
    pub fn port_conflict<S: Into<String>>(message: S) -> Self {
        Self::PortConflict(message.into())
    }

    /// Create a new process exit error
    pub fn process_exit<S: Into<String>>(message: S) -> Self {
        Self::ProcessExit(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new output parse error
    pub fn output_parse<S: Into<String>>(message: S) -> Self {
        Self::OutputParse(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new interruption error
    pub fn interrupted<S: Into<String>>(message: S) -> Self {
        Self::Interrupted(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::ShapingApplication(_) => "SHAPING",
            Self::PortConflict(_) => "PORT",
            Self::ProcessExit(_) => "PROCESS",
            Self::Timeout(_) => "TIMEOUT",
            Self::OutputParse(_) => "OUTPUT",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Interrupted(_) => "INTERRUPTED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this error aborts the whole sweep rather than a single trial
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Parse(_) | Self::Io(_) | Self::Interrupted(_) | Self::Internal(_) => true,
            Self::ShapingApplication(_)
            | Self::PortConflict(_)
            | Self::ProcessExit(_)
            | Self::Timeout(_)
            | Self::OutputParse(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments.", msg)
            }
            Self::ShapingApplication(msg) => {
                format!("Traffic shaping could not be applied: {}\n\nSuggestion: Run as root and make sure tcset or tc is installed.", msg)
            }
            Self::PortConflict(msg) => {
                format!("Server port is busy: {}\n\nSuggestion: Stop the process holding the port or choose another with --port.", msg)
            }
            Self::ProcessExit(msg) => {
                format!("External process failed: {}\n\nSuggestion: Run the client or server manually to inspect its output.", msg)
            }
            Self::Timeout(msg) => {
                format!("Attempt timed out: {}\n\nSuggestion: Increase the timeout value using --timeout.", msg)
            }
            Self::OutputParse(msg) => {
                format!("Unexpected client output: {}\n\nSuggestion: The client must print 'Transmission took <N> ms' on success.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse value: {}\n\nSuggestion: Check delay, bandwidth and size token formats.", msg)
            }
            Self::Interrupted(msg) => {
                format!("Sweep interrupted: {}\n\nResults recorded so far are preserved in the result log.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) => 1,
            Self::ShapingApplication(_) | Self::PortConflict(_) => 2,
            Self::Timeout(_) => 3,
            Self::ProcessExit(_) | Self::OutputParse(_) => 4,
            Self::Io(_) => 5,
            Self::Interrupted(_) => 130,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::ShapingApplication(_) | Self::PortConflict(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::ProcessExit(_) | Self::OutputParse(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::Interrupted(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<regex::Error> for AppError {
    fn from(error: regex::Error) -> Self {
        Self::internal(format!("Regex error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

// Anyhow integration
/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let original = e.into();
            let message = format!("{}: {}", f(), original);
            match original {
                AppError::Config(_) => AppError::Config(message),
                AppError::ShapingApplication(_) => AppError::ShapingApplication(message),
                AppError::PortConflict(_) => AppError::PortConflict(message),
                AppError::ProcessExit(_) => AppError::ProcessExit(message),
                AppError::Timeout(_) => AppError::Timeout(message),
                AppError::OutputParse(_) => AppError::OutputParse(message),
                AppError::Io(_) => AppError::Io(message),
                AppError::Parse(_) => AppError::Parse(message),
                AppError::Interrupted(_) => AppError::Interrupted(message),
                AppError::Internal(_) => AppError::Internal(message),
            }
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

/// Error reporter for user-facing error output
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            eprintln!();
            eprintln!("{}", error.user_friendly_message());
        }
    }
}
