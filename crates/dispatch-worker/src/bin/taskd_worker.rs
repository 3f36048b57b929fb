// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! taskd-worker: connects to a Master, hosts one long-lived agent
//! subprocess, and executes the prompts it's assigned.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dispatch_core::WorkerId;
use dispatch_worker::agent_process::{AgentCommand, ChildAgentProcess};
use dispatch_worker::{refuse_if_api_key_present, AgentSupervisor};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 34567;
const AGENT_PROGRAM: &str = "agent";
const DEFAULT_ALLOWED_TOOLS: &str = "Read,Write,Edit,Bash";

/// Hosts one long-lived agent process and executes the prompts a Master
/// assigns it.
#[derive(Parser)]
#[command(name = "taskd-worker", version)]
struct Cli {
    /// Master host to connect to.
    #[arg(default_value = DEFAULT_HOST)]
    host: String,

    /// Master port to connect to.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Working directory for the agent subprocess (default: current directory).
    #[arg(long = "root-dir", value_name = "PATH")]
    root_dir: Option<PathBuf>,

    /// Use the Opus model instead of the default.
    #[arg(long)]
    opus: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    refuse_if_api_key_present().context("refusing to start")?;

    let cli = Cli::parse();
    let root = match cli.root_dir {
        Some(path) => path,
        None => std::env::current_dir().context("resolving current directory")?,
    };

    let stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("connecting to master at {}:{}", cli.host, cli.port))?;
    let local_port = stream.local_addr().context("reading local address")?.port();
    let worker_id = WorkerId::new(local_port.to_string());
    info!(%worker_id, host = %cli.host, port = cli.port, "connected to master");

    let agent_command = build_agent_command(cli.opus, root);
    let agent = ChildAgentProcess::spawn(agent_command)
        .await
        .context("spawning agent process")?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let supervisor = AgentSupervisor::new(agent, worker_id.clone(), cmd_rx, out_tx);
    let supervisor_handle = tokio::spawn(supervisor.run());

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt; shutting down");
            signal_shutdown.cancel();
        }
    });

    dispatch_worker::protocol::run(stream, worker_id, cmd_tx, out_rx, supervisor_handle, shutdown)
        .await
        .context("protocol loop exited with an error")?;

    info!("taskd-worker exited cleanly");
    Ok(())
}

/// Builds the agent's spawn command: verbose mode, NDJSON output, a
/// permitted tool set, and an optional model selector.
fn build_agent_command(opus: bool, cwd: PathBuf) -> AgentCommand {
    let mut args = vec![
        "--verbose".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--allowed-tools".to_string(),
        DEFAULT_ALLOWED_TOOLS.to_string(),
    ];
    if opus {
        args.push("--model".to_string());
        args.push("opus".to_string());
    }

    AgentCommand {
        program: AGENT_PROGRAM.to_string(),
        args,
        cwd,
    }
}
