//! Traffic shaping: parameter derivation and the owned shaping resource
//!
//! The interface is a process-wide singleton. [`ShapingController::apply`]
//! hands out a [`ShapingLease`] that returns the interface to its unshaped
//! baseline when released or dropped.

pub mod commands;

use crate::logging::Logger;
use crate::types::{BandwidthSpec, DelaySpec};
use commands::{run_checked, AdminCommand, CommandRunner, SystemRunner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Smallest token bucket handed to tbf
pub const MIN_BURST_KBIT: u64 = 64;

/// Smallest tbf queue latency bound
pub const MIN_LATENCY_MS: u64 = 200;

/// Concrete traffic-control parameters for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapingConfig {
    pub rate_kbps: u64,
    pub delay_ms: u64,
    pub burst_kbit: u64,
    pub latency_ms: u64,
}

impl ShapingConfig {
    /// Derive shaping parameters from a trial's bandwidth and delay
    pub fn derive(bandwidth: &BandwidthSpec, delay: &DelaySpec) -> Self {
        let rate_kbps = bandwidth.kbps();
        let delay_ms = delay.millis();

        let burst = (rate_kbps as f64 * (delay_ms as f64 / 1000.0) * 1.2).round() as u64;
        let latency = delay_ms.saturating_mul(2).saturating_add(200);

        Self {
            rate_kbps,
            delay_ms,
            burst_kbit: burst.max(MIN_BURST_KBIT),
            latency_ms: latency.max(MIN_LATENCY_MS),
        }
    }
}

impl fmt::Display for ShapingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate={}kbit delay={}ms burst={}kbit latency={}ms",
            self.rate_kbps, self.delay_ms, self.burst_kbit, self.latency_ms
        )
    }
}

/// How shaping ended up being applied for a trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapingApplication {
    /// `tcset` succeeded
    Preferred,
    /// `tc` netem + tbf succeeded
    Fallback,
    /// Shaping disabled by configuration
    Skipped,
    /// Both strategies failed; the trial runs on the bare link
    Unshaped { reason: String },
}

impl ShapingApplication {
    pub fn is_shaped(&self) -> bool {
        matches!(self, Self::Preferred | Self::Fallback)
    }
}

impl fmt::Display for ShapingApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preferred => write!(f, "tcset"),
            Self::Fallback => write!(f, "tc netem+tbf"),
            Self::Skipped => write!(f, "disabled"),
            Self::Unshaped { reason } => write!(f, "unshaped ({})", reason),
        }
    }
}

/// Owner of the shaping state of one interface
pub struct ShapingController {
    interface: Option<String>,
    enabled: bool,
    runner: Arc<dyn CommandRunner>,
    logger: Logger,
}

impl ShapingController {
    pub fn new(interface: Option<String>, enabled: bool, logger: Logger) -> Self {
        Self::with_runner(interface, enabled, Arc::new(SystemRunner), logger)
    }

    pub fn with_runner(
        interface: Option<String>,
        enabled: bool,
        runner: Arc<dyn CommandRunner>,
        logger: Logger,
    ) -> Self {
        Self {
            interface,
            enabled,
            runner,
            logger,
        }
    }

    /// Controller that never touches the host
    pub fn disabled(logger: Logger) -> Self {
        Self::new(None, false, logger)
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Apply shaping for one trial.
    ///
    /// Never fails: if neither strategy works the lease reports
    /// [`ShapingApplication::Unshaped`] and the trial runs on the bare link.
    pub fn apply(&self, config: &ShapingConfig) -> ShapingLease {
        if !self.enabled {
            return self.lease(ShapingApplication::Skipped, false);
        }

        let Some(interface) = self.interface.as_deref() else {
            return self.lease(
                ShapingApplication::Unshaped {
                    reason: "no network interface available".to_string(),
                },
                false,
            );
        };

        let preferred = commands::tcset(interface, config);
        let preferred_err = match run_checked(self.runner.as_ref(), &preferred) {
            Ok(_) => {
                self.logger
                    .debug(&format!("Applied shaping with tcset: {}", config))
                    .field("interface", interface)
                    .log();
                return self.lease(ShapingApplication::Preferred, true);
            }
            Err(e) => e,
        };

        self.logger
            .debug(&format!("tcset failed, falling back to tc: {}", preferred_err))
            .field("interface", interface)
            .log();

        // Clear whatever partial state tcset may have left
        self.run_best_effort(&AdminCommand::new("tc", &["qdisc", "del", "dev", interface, "root"]));

        let fallback = run_checked(self.runner.as_ref(), &commands::netem_delay(interface, config))
            .and_then(|_| run_checked(self.runner.as_ref(), &commands::tbf_rate(interface, config)));

        match fallback {
            Ok(_) => {
                self.logger
                    .debug(&format!("Applied shaping with tc netem+tbf: {}", config))
                    .field("interface", interface)
                    .log();
                self.lease(ShapingApplication::Fallback, true)
            }
            Err(fallback_err) => {
                self.reset();
                let reason = format!("tcset: {}; tc: {}", preferred_err, fallback_err);
                self.logger
                    .warn(&format!("Shaping could not be applied, trial runs unshaped: {}", reason))
                    .field("interface", interface)
                    .field("error_category", "SHAPING")
                    .log();
                self.lease(ShapingApplication::Unshaped { reason }, false)
            }
        }
    }

    /// Return the interface to its unshaped baseline. Best-effort.
    pub fn reset(&self) {
        if !self.enabled {
            return;
        }
        if let Some(interface) = self.interface.as_deref() {
            reset_interface(self.runner.as_ref(), interface, &self.logger);
        }
    }

    fn lease(&self, application: ShapingApplication, active: bool) -> ShapingLease {
        ShapingLease {
            interface: self.interface.clone(),
            runner: Arc::clone(&self.runner),
            logger: self.logger.clone(),
            application,
            active,
        }
    }

    fn run_best_effort(&self, command: &AdminCommand) {
        if let Err(e) = run_checked(self.runner.as_ref(), command) {
            self.logger.trace(&format!("ignored: {}", e)).log();
        }
    }
}

/// Shaping held for the duration of one trial
#[must_use = "dropping the lease resets shaping immediately"]
pub struct ShapingLease {
    interface: Option<String>,
    runner: Arc<dyn CommandRunner>,
    logger: Logger,
    application: ShapingApplication,
    active: bool,
}

impl ShapingLease {
    pub fn application(&self) -> &ShapingApplication {
        &self.application
    }

    /// Reset shaping now
    pub fn release(mut self) {
        self.reset_now();
    }

    fn reset_now(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(interface) = self.interface.as_deref() {
            reset_interface(self.runner.as_ref(), interface, &self.logger);
        }
    }
}

impl Drop for ShapingLease {
    fn drop(&mut self) {
        self.reset_now();
    }
}

fn reset_interface(runner: &dyn CommandRunner, interface: &str, logger: &Logger) {
    for command in commands::reset(interface) {
        // Either tool may be missing or have nothing to delete
        if let Err(e) = run_checked(runner, &command) {
            logger.trace(&format!("reset step ignored: {}", e)).log();
        }
    }
    logger.debug("Shaping reset").field("interface", interface).log();
}
