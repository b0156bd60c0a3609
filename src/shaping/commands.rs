//! Traffic-control command construction and execution
//!
//! Commands are built as plain argument vectors so tests can assert on them
//! without privileges. Execution goes through [`CommandRunner`].

use super::ShapingConfig;
use std::fmt;
use std::io;
use std::process::{Command, Stdio};

/// A single external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AdminCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn from_owned(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Short failure description for logs
    pub fn describe_failure(&self) -> String {
        let stderr = self.stderr.trim();
        match (self.code, stderr.is_empty()) {
            (Some(code), true) => format!("exit {}", code),
            (Some(code), false) => format!("exit {}: {}", code, stderr),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {}", stderr),
        }
    }
}

/// Runs administrative commands synchronously.
///
/// Synchronous so that shaping can be reset from `Drop`.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &AdminCommand) -> io::Result<CommandOutput>;
}

/// Runs commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &AdminCommand) -> io::Result<CommandOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and turn a non-zero exit into an error
pub fn run_checked(runner: &dyn CommandRunner, command: &AdminCommand) -> io::Result<CommandOutput> {
    let output = runner.run(command)?;
    if output.success {
        Ok(output)
    } else {
        Err(io::Error::other(format!("`{}` failed: {}", command, output.describe_failure())))
    }
}

/// `tcset <iface> --rate <kbps>Kbps --delay <ms>ms --overwrite`
pub fn tcset(interface: &str, config: &ShapingConfig) -> AdminCommand {
    AdminCommand::from_owned(
        "tcset",
        vec![
            interface.to_string(),
            "--rate".to_string(),
            format!("{}Kbps", config.rate_kbps),
            "--delay".to_string(),
            format!("{}ms", config.delay_ms),
            "--overwrite".to_string(),
        ],
    )
}

/// Root netem qdisc carrying the delay
pub fn netem_delay(interface: &str, config: &ShapingConfig) -> AdminCommand {
    AdminCommand::from_owned(
        "tc",
        vec![
            "qdisc".into(),
            "add".into(),
            "dev".into(),
            interface.into(),
            "root".into(),
            "handle".into(),
            "1:".into(),
            "netem".into(),
            "delay".into(),
            format!("{}ms", config.delay_ms),
        ],
    )
}

/// Token bucket rate limiter chained beneath the netem qdisc
pub fn tbf_rate(interface: &str, config: &ShapingConfig) -> AdminCommand {
    AdminCommand::from_owned(
        "tc",
        vec![
            "qdisc".into(),
            "add".into(),
            "dev".into(),
            interface.into(),
            "parent".into(),
            "1:1".into(),
            "handle".into(),
            "10:".into(),
            "tbf".into(),
            "rate".into(),
            format!("{}kbit", config.rate_kbps),
            "burst".into(),
            format!("{}kbit", config.burst_kbit),
            "latency".into(),
            format!("{}ms", config.latency_ms),
        ],
    )
}

/// Commands that return the interface to its unshaped baseline
pub fn reset(interface: &str) -> Vec<AdminCommand> {
    vec![
        AdminCommand::new("tcdel", &[interface, "--all"]),
        AdminCommand::new("tc", &["qdisc", "del", "dev", interface, "root"]),
    ]
}
