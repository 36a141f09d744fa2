// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

/// The multi-wave therapy-session analysis orchestrator.
///
/// Configuration (remote model credentials, pool size, compaction strategy)
/// is read from the environment on every startup — see `confide-config`.
/// Running with no subcommand starts the HTTP server.
#[derive(Parser, Debug)]
#[command(name = "confide", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Address the HTTP API binds to.
    #[arg(long, default_value = "127.0.0.1:8080", global = true)]
    pub bind: SocketAddr,

    /// Path to the SQLite store. Defaults to an in-memory store, which does
    /// not survive a restart — set this for any persistent deployment.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Increase log verbosity (stderr, human-readable). Without this flag
    /// logging follows `RUST_LOG`, defaulting to `info`.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,

    /// Print the resolved configuration and exit, without starting a server.
    ShowConfig,

    /// Print shell completions for the given shell.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
