// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 p11perf contributors

//! p11perf CLI
//!
//! Command-line interface for the p11perf token latency benchmark.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use p11perf_benchmark::ReporterError;
use p11perf_core::PerfError;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::run::RunArgs;

/// Exit code for failures outside the engine's error taxonomy.
const EXIT_FAILURE: u8 = 1;
/// Exit code for report output failures.
const EXIT_IOERR: u8 = 74;

/// p11perf - Concurrent latency benchmark for cryptographic tokens
#[derive(Parser)]
#[command(name = "p11perf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate keys and run the selected benchmarks
    Run(RunArgs),

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// List the supported vendor flavours
    Flavours,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Dispatch to command handlers
    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(&args),
        Commands::Validate { file } => commands::validate::execute(&file),
        Commands::Flavours => commands::flavours::execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("✗ {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Map an error to a sysexits-style process exit code.
fn exit_code(error: &anyhow::Error) -> u8 {
    if let Some(perf) = error.downcast_ref::<PerfError>() {
        perf.exit_code()
    } else if error.downcast_ref::<ReporterError>().is_some() {
        EXIT_IOERR
    } else {
        EXIT_FAILURE
    }
}
