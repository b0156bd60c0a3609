//! netsweep - Main CLI Application
//!
//! Sweeps emulated delay, bandwidth and payload-size conditions through an
//! external file-transfer client/server pair and logs every trial to CSV.

use clap::Parser;
use netsweep::{app::{install_panic_hook, App}, cli::Cli, error::{AppError, ErrorReporter, Result}};
use std::{error::Error, process};

#[tokio::main]
async fn main() {
    install_panic_hook();

    let cli = Cli::parse();
    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);

    if let Err(e) = run_application(cli).await {
        reporter.report_error(&e);

        if let Some(source) = e.source() {
            eprintln!("Caused by: {}", source);
        }

        print_error_suggestions(&e);

        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<()> {
    App::new(cli)?.run().await
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Parse(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file format (netsweep --init-env .env.example)");
            eprintln!("  - Delays look like 30ms, bandwidths like 10Mbps or 500Kbps, sizes like 10K or 1M");
            eprintln!("  - Make sure --client and --server point at executable files");
        }
        AppError::Io(_) => {
            eprintln!();
            eprintln!("Result log help:");
            eprintln!("  - Check that the result log directory is writable");
            eprintln!("  - Check free disk space; rows written before the failure are kept");
        }
        AppError::Interrupted(_) => {
            eprintln!();
            eprintln!("Shaping was reset and the server stopped. Completed trials are in the result log.");
        }
        _ => {}
    }
}
