// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Startup sequence shared by every frontend: load configuration from the
//! environment, open the store, and hand both to `confide-node`.
//!
//! Keeping this in its own crate (rather than inline in `src/main.rs`) is
//! what lets `confide-node`'s integration tests and any future frontend
//! reuse the exact same assembly order.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use confide_node::NodeConfig;
use confide_store::Database;

/// Opens the store at `db_path` (or an in-memory one when `None`, for
/// ephemeral/test runs), loads [`confide_config::Config`] from the
/// environment, and runs the HTTP server on `bind_addr` until it exits.
pub async fn run(db_path: Option<&Path>, bind_addr: SocketAddr) -> anyhow::Result<()> {
    let config = confide_config::load().context("loading configuration from the environment")?;

    let db = match db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening store");
            Database::open(path).with_context(|| format!("opening store at {}", path.display()))?
        }
        None => {
            tracing::info!("opening in-memory store");
            Database::open_in_memory().context("opening in-memory store")?
        }
    };

    confide_node::run(NodeConfig { bind_addr }, config, db).await
}
