// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's protocol loop: framed TCP dialogue with the Master that
//! stays responsive to `CHECK` while the supervisor runs a long task.

use std::time::Duration;

use dispatch_core::WorkerId;
use dispatch_wire::{encode, FrameReader, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::supervisor::{Outcome, SupervisorCommand};
use crate::WorkerError;

/// How long to wait for `JOIN_ACK` after sending `JOIN`.
const JOIN_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BUF_SIZE: usize = 8192;
/// Bounded join on the supervisor thread during shutdown.
const SUPERVISOR_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the protocol loop to completion: `JOIN` handshake, steady state,
/// then an orderly shutdown of both the connection and the supervisor.
///
/// `supervisor_handle` is joined (bounded) as the last shutdown step, so
/// this function owns the supervisor's full lifecycle on the worker side.
pub async fn run(
    stream: TcpStream,
    worker_id: WorkerId,
    supervisor_tx: mpsc::UnboundedSender<SupervisorCommand>,
    mut supervisor_outbox: mpsc::UnboundedReceiver<Outcome>,
    supervisor_handle: JoinHandle<()>,
    shutdown: CancellationToken,
) -> Result<(), WorkerError> {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut framer = FrameReader::new();

    send(&mut write_half, &Message::Join { msg: worker_id.to_string() }).await?;
    wait_for_join_ack(&mut read_half, &mut framer).await?;
    info!(%worker_id, "joined master");

    let mut buf = [0u8; READ_BUF_SIZE];
    'steady: loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("local shutdown requested");
                break 'steady;
            }
            read = read_half.read(&mut buf) => {
                match read {
                    Ok(0) => {
                        debug!("master closed the connection");
                        break 'steady;
                    }
                    Ok(n) => {
                        framer.push_bytes(&buf[..n]);
                        loop {
                            match framer.next_frame() {
                                Some(Ok(message)) => {
                                    if handle_inbound(message, &mut write_half, &supervisor_tx).await? {
                                        break 'steady;
                                    }
                                }
                                Some(Err(e)) => warn!(error = %e, "dropping malformed frame"),
                                None => break,
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "read error; closing connection");
                        break 'steady;
                    }
                }
            }
            outcome = supervisor_outbox.recv() => {
                match outcome {
                    Some(outcome) => report_outcome(&mut write_half, &worker_id, outcome).await?,
                    None => {
                        warn!("agent supervisor exited; closing connection");
                        break 'steady;
                    }
                }
            }
        }
    }

    shutdown_connection(write_half, supervisor_tx, supervisor_handle).await;
    Ok(())
}

/// Dispatches one inbound frame. Returns `true` if the loop should exit
/// (a `DISCONNECT` was received).
async fn handle_inbound(
    message: Message,
    write_half: &mut OwnedWriteHalf,
    supervisor_tx: &mpsc::UnboundedSender<SupervisorCommand>,
) -> Result<bool, WorkerError> {
    match message {
        Message::Check { req_id, .. } => {
            // Synchronously, before anything else — the 3 s ack deadline
            // must hold regardless of supervisor state.
            send(
                write_half,
                &Message::CheckAck {
                    msg: String::new(),
                    req_id,
                },
            )
            .await?;
            Ok(false)
        }
        Message::Request { msg, req_id } => {
            send(
                write_half,
                &Message::RequestAck {
                    msg: String::new(),
                    req_id: req_id.clone(),
                },
            )
            .await?;
            // The wire REQUEST carries only the prompt text and req_id; the
            // task's real filename is authoritative only at the Master,
            // which reports it by its own assignment record rather than
            // trusting this worker's echo. This placeholder only needs to
            // be unique and stable for the duration of one request.
            let task_filename = format!("task_{}", req_id.as_str());
            let _ = supervisor_tx.send(SupervisorCommand::Request {
                prompt: msg,
                req_id,
                task_filename,
            });
            Ok(false)
        }
        Message::Disconnect { .. } => {
            info!("received DISCONNECT from master");
            Ok(true)
        }
        other => {
            warn!(kind = other.type_name(), "unexpected message from master; ignoring");
            Ok(false)
        }
    }
}

async fn report_outcome(
    write_half: &mut OwnedWriteHalf,
    worker_id: &WorkerId,
    outcome: Outcome,
) -> Result<(), WorkerError> {
    let message = match outcome {
        Outcome::Done { task_filename } => Message::Done { msg: task_filename },
        Outcome::Failed { task_filename } => Message::Failed { msg: task_filename },
        Outcome::UsageLimited { worker_id: id } => {
            debug_assert_eq!(&id, worker_id);
            Message::UsageLimited { msg: id.to_string() }
        }
    };
    send(write_half, &message).await
}

/// Orderly shutdown: announce departure, close the socket, tell the
/// supervisor to exit, and join it within a bounded grace period.
async fn shutdown_connection(
    mut write_half: OwnedWriteHalf,
    supervisor_tx: mpsc::UnboundedSender<SupervisorCommand>,
    supervisor_handle: JoinHandle<()>,
) {
    let _ = send(&mut write_half, &Message::Leave { msg: String::new() }).await;
    let _ = write_half.shutdown().await;
    let _ = supervisor_tx.send(SupervisorCommand::Exit);

    if tokio::time::timeout(SUPERVISOR_JOIN_TIMEOUT, supervisor_handle).await.is_err() {
        warn!("supervisor did not exit within the shutdown grace period");
    }
}

async fn send(write_half: &mut OwnedWriteHalf, message: &Message) -> Result<(), WorkerError> {
    write_half.write_all(&encode(message)).await?;
    Ok(())
}

/// Reads frames until `JOIN_ACK` arrives or [`JOIN_ACK_TIMEOUT`] elapses.
async fn wait_for_join_ack(read_half: &mut OwnedReadHalf, framer: &mut FrameReader) -> Result<(), WorkerError> {
    let outcome = tokio::time::timeout(JOIN_ACK_TIMEOUT, async {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match framer.next_frame() {
                Some(Ok(Message::JoinAck { .. })) => return Ok(()),
                Some(Ok(other)) => {
                    warn!(kind = other.type_name(), "expected JOIN_ACK as the first frame");
                    continue;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "malformed frame while awaiting JOIN_ACK");
                    continue;
                }
                None => {}
            }
            match read_half.read(&mut buf).await {
                Ok(0) => return Err(WorkerError::JoinAckClosed),
                Ok(n) => framer.push_bytes(&buf[..n]),
                Err(e) => return Err(WorkerError::from(e)),
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_elapsed) => Err(WorkerError::JoinAckTimeout),
    }
}
