// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// §7's exit codes for subprocess invocations: config errors are distinct
/// from a failed bind/listen so an operator's supervisor can tell "fix the
/// environment" apart from "the port is taken".
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "confide exited with an error");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Completions { shell }) => {
            cli::print_completions(shell);
            Ok(())
        }
        Some(Commands::ShowConfig) => {
            let config = confide_config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Serve) | None => confide_bootstrap::run(cli.db.as_deref(), cli.bind).await,
    }
}

/// Only [`confide_config::ConfigError`] is distinguishable from the outside
/// without downcasting through every layer `anyhow::Context` adds; anything
/// else (bind failure, store I/O) is a runtime error.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let is_config_error = err.chain().any(|cause| cause.downcast_ref::<confide_config::ConfigError>().is_some());
    if is_config_error {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_RUNTIME_ERROR
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(true)).with(filter).try_init();
}
