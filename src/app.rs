//! Main application orchestration and execution

use crate::{
    cli::Cli,
    config::{display_config_summary, load_config, validate_config, ConfigValidator, EnvManager, ValidationLevel},
    error::{AppError, Result},
    executor::{ClientInvocation, ExecutionConfig, TrialExecutor},
    log_info, log_warn,
    logging::{Logger, LoggerFactory},
    models::Config,
    output::{ResultSink, SummaryFormatter},
    payload::PayloadStore,
    process::{interface::detect_interface, ProcessManager},
    shaping::{commands::SystemRunner, ShapingController},
    sweep::{SweepController, SweepParts},
};
use std::sync::Arc;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Result<Self> {
        Ok(Self { cli })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        if let Some(path) = &self.cli.init_env {
            EnvManager::save_example_env_file(path)?;
            println!("Wrote example configuration to {}", path.display());
            return Ok(());
        }

        let config = load_config(self.cli.clone())?;
        let warnings = validate_config(&config)?;

        let factory = LoggerFactory::new(config.clone());
        let logger = factory.create_logger("APP");

        if config.debug {
            println!(
                "{} v{} ({} {}, built {})",
                crate::PKG_NAME,
                crate::VERSION,
                crate::GIT_COMMIT.unwrap_or("unknown"),
                crate::TARGET_TRIPLE,
                crate::BUILD_TIME
            );
            println!("\nConfiguration Summary:");
            println!("{}\n", display_config_summary(&config));
        }

        let shown: Vec<_> = warnings
            .iter()
            .filter(|w| config.verbose || w.level != ValidationLevel::Info)
            .collect();
        if !shown.is_empty() {
            println!("Configuration Warnings:");
            for warning in shown {
                println!("  {}", warning.format(config.enable_color));
            }
            println!();
        }

        let grid = config.grid()?;
        let interface = resolve_interface(&config, &logger);
        let formatter = SummaryFormatter::new(config.enable_color);

        if self.cli.dry_run {
            print!("{}", formatter.format_plan(&grid, interface.as_deref(), config.enable_shaping));
            return Ok(());
        }

        ConfigValidator::validate_executables(&config)?;

        let shaping = Arc::new(ShapingController::new(
            interface,
            config.enable_shaping,
            factory.create_logger("SHAPING"),
        ));
        let processes = ProcessManager::new(&config, Arc::clone(&shaping), factory.create_logger("PROCESS"));
        let executor = TrialExecutor::new(
            ExecutionConfig::from(&config),
            ClientInvocation::from_config(&config),
            factory.create_trial_logger(),
        );
        let sink = ResultSink::open(&config.result_log)?;

        let parts = SweepParts {
            grid,
            payloads: PayloadStore::new(&config.payload_dir),
            processes,
            shaping,
            executor,
            sink,
            settle: config.settle(),
            server_exit_grace: config.server_exit_grace(),
        };
        let mut controller = SweepController::new(parts, &factory);

        let result = tokio::select! {
            result = controller.run() => result,
            _ = tokio::signal::ctrl_c() => {
                log_warn!(logger, "Interrupted, restoring the interface and stopping the server");
                controller.teardown(true).await;
                Err(AppError::interrupted("received Ctrl-C"))
            }
        };

        println!();
        print!("{}", formatter.format_summary(controller.summary()));

        if let Some(path) = &self.cli.summary_json {
            controller.summary().write_json(path)?;
            if config.verbose {
                println!("Summary written to {}", path.display());
            }
        }

        result
    }
}

/// Report panics without terminating the process.
///
/// The panic then unwinds through the sweep, so a held shaping lease and the
/// tracked server are cleaned up by their destructors before exit.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Resetting shaping and stopping the server before exit.");
    }));
}

/// Configured interface, or the one the route to the server goes through
fn resolve_interface(config: &Config, logger: &Logger) -> Option<String> {
    if let Some(interface) = &config.network_interface {
        return Some(interface.clone());
    }
    if !config.enable_shaping {
        return None;
    }

    let Some(ip) = config.resolve_server_ip() else {
        log_warn!(
            logger,
            "Server address {} does not resolve; trials will run unshaped",
            config.server_address
        );
        return None;
    };

    let detected = detect_interface(&SystemRunner, ip);
    match &detected {
        Some(interface) => log_info!(logger, "Detected network interface {}", interface),
        None => log_warn!(logger, "No network interface detected; trials will run unshaped"),
    }
    detected
}
