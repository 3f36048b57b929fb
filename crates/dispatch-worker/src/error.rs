// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to connect to master at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out waiting for JOIN_ACK")]
    JoinAckTimeout,

    #[error("master closed the connection before JOIN_ACK")]
    JoinAckClosed,

    #[error("spawning agent process failed: {0}")]
    SpawnFailed(io::Error),

    #[error("agent environment refused to start: {0}")]
    EnvironmentRefused(String),
}
