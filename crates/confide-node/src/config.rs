// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP bind configuration. Pipeline behavior (model tier, pool size,
//! compaction strategy, event TTLs) lives in `confide_config::Config`; this
//! is just where the listener binds.

use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 8080).into(),
        }
    }
}
