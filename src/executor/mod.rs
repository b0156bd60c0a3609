//! Trial execution engine
//!
//! This module runs the client executable against a live server:
//! - One attempt per invocation under a wall-clock timeout
//! - Bounded retries with a fixed sleep between failed attempts
//! - Classification of every attempt into a [`TrialOutcome`]

pub mod classify;

pub use classify::{classify_attempt, parse_transmission_time, reduce_attempts, sanitize, AttemptExit};

use crate::{
    error::Result,
    logging::TrialLogger,
    models::{AttemptReport, Config, Trial, TrialOutcome},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Retry and timeout settings for trial execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum client attempts per trial
    pub retries: u32,
    /// Wall-clock budget for one attempt
    pub attempt_timeout: Duration,
    /// Pause after a failed attempt when attempts remain
    pub retry_sleep: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retries: crate::defaults::DEFAULT_RETRIES,
            attempt_timeout: crate::defaults::DEFAULT_TIMEOUT,
            retry_sleep: crate::defaults::DEFAULT_RETRY_SLEEP,
        }
    }
}

impl From<&Config> for ExecutionConfig {
    fn from(config: &Config) -> Self {
        Self {
            retries: config.retries,
            attempt_timeout: config.timeout(),
            retry_sleep: config.retry_sleep(),
        }
    }
}

/// How to invoke the client: `client <address> <port> <input-file>`
#[derive(Debug, Clone)]
pub struct ClientInvocation {
    pub program: PathBuf,
    pub address: String,
    pub port: u16,
}

impl ClientInvocation {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.client_bin.clone(),
            address: config.server_address.clone(),
            port: config.server_port,
        }
    }
}

/// Hook run before every client attempt, e.g. to make sure a server is up
#[async_trait]
pub trait AttemptTarget: Send {
    /// `attempt` is 1-based
    async fn before_attempt(&mut self, attempt: u32) -> Result<()>;
}

/// Target that needs no preparation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTarget;

#[async_trait]
impl AttemptTarget for NoopTarget {
    async fn before_attempt(&mut self, _attempt: u32) -> Result<()> {
        Ok(())
    }
}

/// Everything one trial execution produced
#[derive(Debug, Clone)]
pub struct TrialExecution {
    /// Outcome to persist
    pub outcome: TrialOutcome,
    /// Every attempt in order
    pub attempts: Vec<AttemptReport>,
}

/// Runs the client for one trial with retries
pub struct TrialExecutor {
    config: ExecutionConfig,
    client: ClientInvocation,
    logger: TrialLogger,
}

impl TrialExecutor {
    pub fn new(config: ExecutionConfig, client: ClientInvocation, logger: TrialLogger) -> Self {
        Self { config, client, logger }
    }

    /// Execute a trial: up to `retries` attempts, stopping at the first success.
    /// Failed intermediate attempts are logged only.
    pub async fn execute(
        &self,
        trial: &Trial,
        input: &Path,
        target: &mut dyn AttemptTarget,
        correlation_id: &str,
    ) -> TrialExecution {
        let max_attempts = self.config.retries.max(1);
        let mut attempts = Vec::with_capacity(max_attempts as usize);

        for attempt in 1..=max_attempts {
            if let Err(e) = target.before_attempt(attempt).await {
                self.logger
                    .logger()
                    .warn(&format!("Preparing attempt {} failed: {}", attempt, e))
                    .correlation_id(correlation_id)
                    .trial(trial)
                    .error_info(&e)
                    .log();
            }

            let started = Instant::now();
            let outcome = self.run_attempt(input).await;
            let report = AttemptReport {
                attempt,
                outcome,
                duration: started.elapsed(),
            };

            self.logger.attempt(trial, &report, max_attempts, correlation_id);
            let succeeded = report.outcome.is_success();
            attempts.push(report);

            if succeeded {
                break;
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_sleep).await;
            }
        }

        let outcome = reduce_attempts(&attempts).unwrap_or_else(|| TrialOutcome::ProcessError {
            exit_code: -1,
            message: "no attempt was made".to_string(),
        });

        TrialExecution { outcome, attempts }
    }

    /// Run the client once and classify the result
    pub async fn run_attempt(&self, input: &Path) -> TrialOutcome {
        let spawned = Command::new(&self.client.program)
            .arg(&self.client.address)
            .arg(self.client.port.to_string())
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return TrialOutcome::ProcessError {
                    exit_code: -1,
                    message: classify::excerpt(&format!("spawn failed: {}", e)),
                }
            }
        };

        // Dropping the future on timeout drops the child, which kills it
        match tokio::time::timeout(self.config.attempt_timeout, child.wait_with_output()).await {
            Err(_) => classify_attempt(AttemptExit::TimedOut, ""),
            Ok(Err(e)) => TrialOutcome::ProcessError {
                exit_code: -1,
                message: classify::excerpt(&format!("wait failed: {}", e)),
            },
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push('\n');
                combined.push_str(&String::from_utf8_lossy(&output.stderr));

                let exit = match output.status.code() {
                    Some(code) => AttemptExit::Exited(code),
                    None => AttemptExit::Signaled,
                };
                classify_attempt(exit, &combined)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn client_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("client");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn executor(program: PathBuf, retries: u32, timeout: Duration) -> TrialExecutor {
        TrialExecutor::new(
            ExecutionConfig {
                retries,
                attempt_timeout: timeout,
                retry_sleep: Duration::from_millis(10),
            },
            ClientInvocation {
                program,
                address: "127.0.0.1".into(),
                port: 5000,
            },
            TrialLogger::from_logger(Logger::silent("TRIAL")),
        )
    }

    fn trial() -> Trial {
        Trial::new(0, "0ms".parse().unwrap(), "1Mbps".parse().unwrap(), "10K".parse().unwrap())
    }

    /// Records which attempts it was asked to prepare
    #[derive(Default)]
    struct CountingTarget {
        attempts: Vec<u32>,
    }

    #[async_trait]
    impl AttemptTarget for CountingTarget {
        async fn before_attempt(&mut self, attempt: u32) -> Result<()> {
            self.attempts.push(attempt);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let dir = TempDir::new().unwrap();
        let client = client_script(dir.path(), "echo 'Transmission took 42 ms'");
        let mut target = CountingTarget::default();

        let execution = executor(client, 3, Duration::from_secs(5))
            .execute(&trial(), Path::new("payload.bin"), &mut target, "c")
            .await;

        assert_eq!(execution.outcome, TrialOutcome::Success { elapsed_ms: 42 });
        assert_eq!(execution.attempts.len(), 1);
        assert_eq!(target.attempts, vec![1]);
    }

    #[tokio::test]
    async fn test_always_timing_out_client_uses_every_attempt() {
        let dir = TempDir::new().unwrap();
        let client = client_script(dir.path(), "exec sleep 5");
        let mut target = CountingTarget::default();

        let execution = executor(client, 3, Duration::from_millis(200))
            .execute(&trial(), Path::new("payload.bin"), &mut target, "c")
            .await;

        assert_eq!(execution.attempts.len(), 3);
        assert_eq!(target.attempts, vec![1, 2, 3]);
        assert_eq!(execution.outcome, TrialOutcome::Timeout);
        assert_eq!(execution.outcome.error_text().unwrap(), "TIMEOUT");
    }

    #[tokio::test]
    async fn test_missing_timing_line_is_parse_failure() {
        let dir = TempDir::new().unwrap();
        let client = client_script(dir.path(), "echo 'transfer complete'");

        let execution = executor(client, 2, Duration::from_secs(5))
            .execute(&trial(), Path::new("payload.bin"), &mut NoopTarget, "c")
            .await;

        assert_eq!(execution.attempts.len(), 2);
        let error = execution.outcome.error_text().unwrap();
        assert!(error.starts_with("PARSE_FAIL:"), "{}", error);
        assert!(error.contains("transfer complete"));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("count");
        let client = client_script(
            dir.path(),
            &format!(
                "n=$(cat {c} 2>/dev/null || echo 0)\nn=$((n+1))\necho $n > {c}\n\
                 if [ $n -lt 2 ]; then echo 'refused' >&2; exit 1; fi\necho 'Transmission took 7 ms'",
                c = counter.display()
            ),
        );

        let execution = executor(client, 3, Duration::from_secs(5))
            .execute(&trial(), Path::new("payload.bin"), &mut NoopTarget, "c")
            .await;

        assert_eq!(execution.attempts.len(), 2);
        assert!(matches!(execution.attempts[0].outcome, TrialOutcome::ProcessError { exit_code: 1, .. }));
        assert_eq!(execution.outcome, TrialOutcome::Success { elapsed_ms: 7 });
    }

    #[tokio::test]
    async fn test_client_arguments_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let client = client_script(dir.path(), "echo \"$1 $2 $3\" >&2\nexit 5");

        let outcome = executor(client, 1, Duration::from_secs(5))
            .run_attempt(Path::new("/tmp/payload_10K.bin"))
            .await;

        assert_eq!(
            outcome,
            TrialOutcome::ProcessError {
                exit_code: 5,
                message: "127.0.0.1 5000 /tmp/payload_10K.bin".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unspawnable_client() {
        let outcome = executor(PathBuf::from("/nonexistent/client"), 1, Duration::from_secs(1))
            .run_attempt(Path::new("payload.bin"))
            .await;

        match outcome {
            TrialOutcome::ProcessError { exit_code, message } => {
                assert_eq!(exit_code, -1);
                assert!(message.starts_with("spawn failed:"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
