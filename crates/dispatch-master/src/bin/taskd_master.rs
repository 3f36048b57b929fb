// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! taskd-master: coordinates a fleet of workers against a file-backed
//! task queue over framed TCP.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dispatch_core::SystemClock;
use dispatch_master::{accept_loop, Scheduler};
use dispatch_taskdir::TaskStore;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_PORT: u16 = 34567;

/// Coordinates a fleet of workers executing prompt-driven agent tasks.
#[derive(Parser)]
#[command(name = "taskd-master", version)]
struct Cli {
    /// Port to listen on.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Root directory holding the `.tasks/` queue (default: current directory).
    #[arg(long = "root-dir", value_name = "PATH")]
    root_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let root = match cli.root_dir {
        Some(path) => path,
        None => std::env::current_dir().context("resolving current directory")?,
    };

    let store = TaskStore::new(root.join(".tasks"));
    store.ensure_directories().context("creating task directories")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "taskd-master listening");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt; shutting down");
            signal_shutdown.cancel();
        }
    });

    let accept_shutdown = shutdown.clone();
    let accept_handle = tokio::spawn(accept_loop(listener, events_tx, accept_shutdown));

    let scheduler = match dispatch_master::env::tick_interval_override() {
        Some(interval) => Scheduler::with_tick_interval(store, SystemClock, shutdown.clone(), interval),
        None => Scheduler::new(store, SystemClock, shutdown.clone()),
    };
    scheduler
        .run(events_rx)
        .await
        .context("scheduler loop exited with an error")?;

    shutdown.cancel();
    let _ = accept_handle.await;

    info!("taskd-master exited cleanly");
    Ok(())
}
