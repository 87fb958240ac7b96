// crates/heapwatch-cli/src/main.rs
// ============================================================================
// Module: Heapwatch CLI
// Description: Binary entry point for the Heapwatch backend.
// Purpose: Load env configuration and run the server.
// Dependencies: heapwatch-config, heapwatch-server, clap, tokio
// ============================================================================

//! ## Overview
//! `heapwatch` is a thin wrapper over the server crate: it parses arguments,
//! loads the environment-driven configuration, and runs the HTTP backend on
//! a multi-thread runtime until interrupted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use heapwatch_config::HeapwatchConfig;
use heapwatch_server::serve;

// ============================================================================
// SECTION: CLI
// ============================================================================

/// Run-lifecycle backend for CI build-process memory monitoring.
#[derive(Parser)]
#[command(name = "heapwatch", about)]
struct Cli {
    /// Subcommand; defaults to `serve`.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Command {
    /// Start the backend (default).
    Serve,
    /// Print version information and exit.
    Version,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Version => {
            let mut out = std::io::stdout();
            let _ = writeln!(out, "heapwatch {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Command::Serve => run_server(),
    }
}

/// Loads configuration and serves until shutdown.
fn run_server() -> ExitCode {
    let config = match HeapwatchConfig::from_env() {
        Ok(config) => config,
        Err(err) => return fail(&format!("configuration error: {err}")),
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => return fail(&format!("runtime error: {err}")),
    };
    match runtime.block_on(serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(&format!("server error: {err}")),
    }
}

/// Writes a startup failure to stderr and returns a failing exit code.
fn fail(message: &str) -> ExitCode {
    let mut err = std::io::stderr();
    let _ = writeln!(err, "heapwatch: {message}");
    ExitCode::FAILURE
}
