// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `opsflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "opsflow",
    version,
    about = "Run workflow definitions (jobs of steps) across fleets of remote hosts.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task definition (TOML).
    #[arg(long, value_name = "PATH", default_value = "opsflow.toml")]
    pub definition: PathBuf,

    /// Host catalog (TOML, `[host.<id>]` sections).
    #[arg(long, value_name = "PATH")]
    pub hosts: Option<PathBuf>,

    /// Action catalog (TOML, `[action.<id>]` sections).
    #[arg(long, value_name = "PATH")]
    pub actions: Option<PathBuf>,

    /// Task id used for result logs; a random UUID if omitted.
    #[arg(long, value_name = "ID")]
    pub task_id: Option<String>,

    /// Override `[config].result_dir`.
    #[arg(long, value_name = "DIR")]
    pub result_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `OPSFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse, build and print the task graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Encrypt a credential with `OPSFLOW_SECRET_KEY`, print it and exit.
    #[arg(long, value_name = "PLAINTEXT")]
    pub encrypt: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
