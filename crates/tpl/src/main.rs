#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::Environment;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("tpl: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Completion { shell } = cli.command {
        commands::completion::run(shell);
        return Ok(ExitCode::SUCCESS);
    }

    let env = Environment::new(commands::load_config(cli.config.as_deref())?);
    match cli.command {
        Commands::Exec(args) => commands::exec::run(&env, args),
        Commands::Ensure(args) => commands::ensure::run(&env, args),
        Commands::Keys(args) => commands::keys::run(&env, args),
        Commands::Completion { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Logs go to stderr so rendered output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
