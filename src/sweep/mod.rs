//! Sweep orchestration
//!
//! Walks the delay × bandwidth × size grid one trial at a time:
//!
//! 1. materialize the payload
//! 2. reclaim the port and start the server
//! 3. apply shaping, run the client, release shaping
//! 4. finalize the server and append the record
//!
//! Every trial ends with a record in the result log, whatever happened.

use crate::error::{AppError, Result};
use crate::executor::{classify, AttemptTarget, TrialExecutor};
use crate::logging::{ErrorEventLogger, Logger, LoggerFactory, TrialLogger};
use crate::models::{ResultRecord, SweepGrid, Trial, TrialOutcome};
use crate::output::{ResultSink, SweepSummary};
use crate::payload::PayloadStore;
use crate::process::ProcessManager;
use crate::shaping::{ShapingApplication, ShapingConfig, ShapingController};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where the controller is within a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepPhase {
    Idle,
    ShapeApply,
    Execute,
    ShapeReset,
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ShapeApply => "shape-apply",
            Self::Execute => "execute",
            Self::ShapeReset => "shape-reset",
        };
        f.write_str(name)
    }
}

/// Components a sweep is assembled from
pub struct SweepParts {
    pub grid: SweepGrid,
    pub payloads: PayloadStore,
    pub processes: ProcessManager,
    pub shaping: Arc<ShapingController>,
    pub executor: TrialExecutor,
    pub sink: ResultSink,
    /// Pause between trials
    pub settle: Duration,
    /// Bound on waiting for the server to exit after a successful client run
    pub server_exit_grace: Duration,
}

/// Sequential sweep state machine
pub struct SweepController {
    parts: SweepParts,
    phase: SweepPhase,
    summary: SweepSummary,
    trial_logger: TrialLogger,
    error_logger: ErrorEventLogger,
    logger: Logger,
}

impl SweepController {
    pub fn new(parts: SweepParts, factory: &LoggerFactory) -> Self {
        let mut controller = Self::with_loggers(
            parts,
            factory.create_trial_logger(),
            factory.create_error_logger(),
            factory.create_logger("SWEEP"),
        );
        controller.summary.session_id = factory.session_id().to_string();
        controller
    }

    pub fn with_loggers(
        parts: SweepParts,
        trial_logger: TrialLogger,
        error_logger: ErrorEventLogger,
        logger: Logger,
    ) -> Self {
        let summary = SweepSummary::new("", parts.grid.len());
        Self {
            parts,
            phase: SweepPhase::Idle,
            summary,
            trial_logger,
            error_logger,
            logger,
        }
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    pub fn summary(&self) -> &SweepSummary {
        &self.summary
    }

    /// Run every trial, then tear down. Only fatal errors (result log
    /// failures, payload directory) stop the sweep early.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_trials().await;
        self.teardown(false).await;
        result
    }

    /// Stop the server, reset shaping and close the summary
    pub async fn teardown(&mut self, interrupted: bool) {
        self.transition(SweepPhase::ShapeReset);
        self.parts.processes.teardown().await;
        self.transition(SweepPhase::Idle);

        if self.summary.finished_at.is_none() {
            self.summary.finish(interrupted);
        }
    }

    async fn run_trials(&mut self) -> Result<()> {
        self.parts.payloads.ensure_dir()?;

        // Clean baseline before the first trial
        self.transition(SweepPhase::ShapeReset);
        self.parts.shaping.reset();
        self.transition(SweepPhase::Idle);

        let trials: Vec<Trial> = self.parts.grid.trials().collect();
        let total = trials.len();
        self.logger
            .info(&format!("Starting sweep of {} trials", total))
            .field("result_log", self.parts.sink.path().display().to_string())
            .log();

        for (index, trial) in trials.iter().enumerate() {
            self.run_trial(trial, total).await?;

            if index + 1 < total {
                tokio::time::sleep(self.parts.settle).await;
            }
        }

        Ok(())
    }

    async fn run_trial(&mut self, trial: &Trial, total: usize) -> Result<()> {
        let correlation_id = self.trial_logger.trial_started(trial, total);

        let input = self.prepare_payload(trial, &correlation_id);

        if let Err(e) = self.parts.processes.reclaim().await {
            self.error_logger.log_error(&e, Some("Reclaiming server port"), Some(&correlation_id));
            self.summary.record_port_conflict();
        }

        let spawned = self.parts.processes.spawn().await.map(|_| ());
        let outcome = match spawned {
            Ok(()) => {
                if !self.parts.processes.await_ready().await {
                    self.logger
                        .debug("Server not seen listening yet; starting the client anyway")
                        .correlation_id(&correlation_id)
                        .log();
                }
                let outcome = self.shaped_execution(trial, &input, &correlation_id).await;
                if let Some(error) = outcome.to_error() {
                    self.error_logger.log_error(&error, Some("Trial failed"), Some(&correlation_id));
                }
                outcome
            }
            Err(e) => {
                self.error_logger.log_error(&e, Some("Starting server"), Some(&correlation_id));
                TrialOutcome::ProcessError {
                    exit_code: -1,
                    message: classify::excerpt(&e.to_string()),
                }
            }
        };

        let record = ResultRecord::from_outcome(trial, &outcome);
        self.parts.sink.append(&record)?;
        self.summary.record_outcome(&outcome);
        self.trial_logger.trial_finished(trial, &outcome, &correlation_id);

        Ok(())
    }

    fn prepare_payload(&mut self, trial: &Trial, correlation_id: &str) -> std::path::PathBuf {
        let size = trial.size();
        let materialization = self.parts.payloads.materialize(size);

        if let Some(reason) = materialization.reason() {
            self.logger
                .warn(&format!("Payload {} is not full size: {}", size, reason))
                .correlation_id(correlation_id)
                .trial(trial)
                .log();
            if !self.summary.degraded_payloads.iter().any(|c| c.subject == size.token()) {
                self.summary.record_degraded_payload(size.token(), reason);
            }
        } else {
            self.logger
                .debug(&format!("Payload {} {:?}", size, materialization))
                .correlation_id(correlation_id)
                .log();
        }

        self.parts.payloads.path_for(size)
    }

    /// Shape, run the client, unshape, finalize the server
    async fn shaped_execution(&mut self, trial: &Trial, input: &std::path::Path, correlation_id: &str) -> TrialOutcome {
        self.transition(SweepPhase::ShapeApply);
        let shaping_config = ShapingConfig::derive(trial.bandwidth(), trial.delay());
        let lease = self.parts.shaping.apply(&shaping_config);

        if let ShapingApplication::Unshaped { reason } = lease.application() {
            let error = AppError::shaping(reason.clone());
            self.error_logger.log_error(&error, Some("Applying shaping"), Some(correlation_id));
            self.summary.record_unshaped(trial, reason);
        }

        self.transition(SweepPhase::Execute);
        let execution = {
            let mut target = ServerRespawn {
                processes: &mut self.parts.processes,
            };
            self.parts
                .executor
                .execute(trial, input, &mut target, correlation_id)
                .await
        };

        self.transition(SweepPhase::ShapeReset);
        lease.release();

        self.finalize_server(&execution.outcome, correlation_id).await;
        self.transition(SweepPhase::Idle);

        execution.outcome
    }

    /// After a success the server should exit on its own within the grace
    /// period; after a failure it is presumed hung and killed.
    async fn finalize_server(&mut self, outcome: &TrialOutcome, correlation_id: &str) {
        if !outcome.is_success() {
            self.parts.processes.terminate().await;
            return;
        }

        let grace = self.parts.server_exit_grace;
        match tokio::time::timeout(grace, self.parts.processes.wait_exit()).await {
            Ok(Ok(0)) => {
                self.logger.debug("Server exited cleanly").correlation_id(correlation_id).log();
            }
            Ok(Ok(code)) => {
                let error = AppError::process_exit(format!("server exited with code {}", code));
                self.error_logger.log_error(&error, None, Some(correlation_id));
            }
            Ok(Err(e)) => {
                self.logger
                    .debug(&format!("No server to wait for: {}", e))
                    .correlation_id(correlation_id)
                    .log();
            }
            Err(_) => {
                self.logger
                    .warn(&format!("Server still running {}s after the transfer, killing it", grace.as_secs()))
                    .correlation_id(correlation_id)
                    .log();
                self.parts.processes.terminate().await;
            }
        }
    }

    fn transition(&mut self, phase: SweepPhase) {
        if self.phase != phase {
            self.logger
                .trace(&format!("{} -> {}", self.phase, phase))
                .field("phase", phase)
                .log();
            self.phase = phase;
        }
    }
}

/// Restarts the server before a retry if the previous attempt consumed it
struct ServerRespawn<'a> {
    processes: &'a mut ProcessManager,
}

#[async_trait]
impl<'a> AttemptTarget for ServerRespawn<'a> {
    async fn before_attempt(&mut self, attempt: u32) -> Result<()> {
        if attempt == 1 || !self.processes.server_exited() {
            return Ok(());
        }

        let reclaimed = self.processes.reclaim().await;
        self.processes.spawn().await?;
        self.processes.await_ready().await;
        reclaimed
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::{ClientInvocation, ExecutionConfig};
    use crate::output::CSV_HEADER;
    use crate::process::ServerSpec;
    use crate::shaping::tests::RecordingRunner;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn grid(delays: &[&str], bandwidths: &[&str], sizes: &[&str]) -> SweepGrid {
        SweepGrid::new(
            delays.iter().map(|s| s.parse().unwrap()).collect(),
            bandwidths.iter().map(|s| s.parse().unwrap()).collect(),
            sizes.iter().map(|s| s.parse().unwrap()).collect(),
        )
    }

    struct Harness {
        _dir: TempDir,
        log: PathBuf,
        shaping_runner: Arc<RecordingRunner>,
        controller: SweepController,
    }

    fn harness(grid: SweepGrid, client_body: &str, server: Option<&str>, retries: u32) -> Harness {
        let dir = TempDir::new().unwrap();
        let client = script(dir.path(), "client", client_body);
        let server = match server {
            Some(body) => script(dir.path(), "server", body),
            None => dir.path().join("missing-server"),
        };
        let log = dir.path().join("results.csv");

        let shaping_runner = Arc::new(RecordingRunner::default());
        let shaping = Arc::new(ShapingController::with_runner(
            Some("lo".into()),
            true,
            shaping_runner.clone(),
            Logger::silent("SHAPE"),
        ));

        let processes = ProcessManager::with_runner(
            ServerSpec {
                program: server,
                address: "127.0.0.1".into(),
                port: 5999,
                output: dir.path().join("received.bin"),
            },
            Duration::from_millis(1),
            Arc::new(RecordingRunner::default()),
            shaping.clone(),
            Logger::silent("PROC"),
        );

        let executor = TrialExecutor::new(
            ExecutionConfig {
                retries,
                attempt_timeout: Duration::from_secs(5),
                retry_sleep: Duration::from_millis(1),
            },
            ClientInvocation {
                program: client,
                address: "127.0.0.1".into(),
                port: 5999,
            },
            TrialLogger::from_logger(Logger::silent("TRIAL")),
        );

        let parts = SweepParts {
            grid,
            payloads: PayloadStore::new(dir.path().join("payloads")),
            processes,
            shaping,
            executor,
            sink: ResultSink::open(&log).unwrap(),
            settle: Duration::from_millis(1),
            server_exit_grace: Duration::from_secs(2),
        };

        let controller = SweepController::with_loggers(
            parts,
            TrialLogger::from_logger(Logger::silent("TRIAL")),
            ErrorEventLogger::from_logger(Logger::silent("ERR")),
            Logger::silent("SWEEP"),
        );

        Harness {
            _dir: dir,
            log,
            shaping_runner,
            controller,
        }
    }

    #[tokio::test]
    async fn test_sweep_records_every_trial_in_order() {
        let mut h = harness(
            grid(&["0ms"], &["1Mbps"], &["10K", "1M"]),
            "echo 'Transmission took 42 ms'",
            Some("exit 0"),
            3,
        );

        h.controller.run().await.unwrap();
        assert_eq!(h.controller.phase(), SweepPhase::Idle);

        let contents = std::fs::read_to_string(&h.log).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![CSV_HEADER, "0ms,1Mbps,10K,42,", "0ms,1Mbps,1M,42,"]);

        let summary = h.controller.summary();
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.succeeded, 2);
        assert!(!summary.interrupted);
        assert!(summary.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_shaping_is_applied_and_reset_around_each_trial() {
        let mut h = harness(
            grid(&["0ms"], &["1Mbps"], &["10K"]),
            "echo 'Transmission took 1 ms'",
            Some("exit 0"),
            1,
        );

        h.controller.run().await.unwrap();

        let calls = h.shaping_runner.calls();
        let reset = ["tcdel lo --all", "tc qdisc del dev lo root"];
        assert_eq!(&calls[0..2], &reset);
        assert_eq!(calls[2], "tcset lo --rate 1000Kbps --delay 0ms --overwrite");
        assert_eq!(&calls[3..5], &reset);
        assert_eq!(&calls[calls.len() - 2..], &reset);
    }

    #[tokio::test]
    async fn test_failures_are_recorded_and_sweep_continues() {
        let mut h = harness(
            grid(&["0ms", "10ms"], &["1Mbps"], &["10K"]),
            "echo 'no timing here'",
            Some("exec sleep 30"),
            2,
        );

        h.controller.run().await.unwrap();

        let contents = std::fs::read_to_string(&h.log).unwrap();
        let rows: Vec<&str> = contents.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        for row in rows {
            let cols: Vec<&str> = row.split(',').collect();
            assert_eq!(cols[3], "");
            assert!(cols[4].starts_with("PARSE_FAIL:"), "{}", row);
        }
        assert_eq!(h.controller.summary().parse_failures, 2);
        assert!(h.controller.parts.processes.server().is_none());
    }

    #[tokio::test]
    async fn test_server_spawn_failure_is_recorded() {
        let mut h = harness(grid(&["0ms"], &["1Mbps"], &["10K"]), "exit 0", None, 1);

        h.controller.run().await.unwrap();

        let contents = std::fs::read_to_string(&h.log).unwrap();
        let row = contents.lines().nth(1).unwrap();
        assert!(row.starts_with("0ms,1Mbps,10K,,EXIT_-1: "), "{}", row);
        assert_eq!(h.controller.summary().process_errors, 1);
    }

    #[tokio::test]
    async fn test_retry_respawns_exited_server() {
        let dir = TempDir::new().unwrap();
        let spawns = dir.path().join("spawns");
        let server_body = format!("echo x >> {}\nexit 0", spawns.display());

        let mut h = harness(
            grid(&["0ms"], &["1Mbps"], &["10K"]),
            "sleep 0.2\nexit 1",
            Some(&server_body),
            3,
        );

        h.controller.run().await.unwrap();

        let count = std::fs::read_to_string(&spawns).unwrap().lines().count();
        assert_eq!(count, 3, "one server per attempt");
        assert_eq!(h.controller.summary().process_errors, 1);
    }
}
