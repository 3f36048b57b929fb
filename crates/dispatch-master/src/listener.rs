// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP accept loop and per-connection I/O.
//!
//! Each connection gets its own reader task here; it only decodes frames
//! and forwards them onto the scheduler's event channel, never touching
//! registry state directly.

use std::time::Duration;

use dispatch_core::WorkerId;
use dispatch_wire::{encode, FrameReader, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::scheduler::MasterEvent;

/// Matches `_handle_new_worker`'s 5 s recv timeout for the handshake.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const READ_BUF_SIZE: usize = 8192;

pub async fn accept_loop(
    listener: TcpListener,
    events: mpsc::UnboundedSender<MasterEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "accepted connection");
                        let events = events.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(handle_connection(stream, events, shutdown));
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    events: mpsc::UnboundedSender<MasterEvent>,
    shutdown: CancellationToken,
) {
    let mut framer = FrameReader::new();
    let Some(id) = read_join(&mut stream, &mut framer).await else {
        return;
    };

    let (mut read_half, mut write_half) = stream.into_split();

    if write_half
        .write_all(&encode(&Message::JoinAck { msg: String::new() }))
        .await
        .is_err()
    {
        return;
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    if events
        .send(MasterEvent::WorkerJoined {
            id: id.clone(),
            outbox: out_tx,
        })
        .is_err()
    {
        return;
    }

    let writer_id = id.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if write_half.write_all(&encode(&message)).await.is_err() {
                debug!(worker = %writer_id, "write failed; closing connection");
                break;
            }
        }
    });

    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            read = read_half.read(&mut buf) => {
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        framer.push_bytes(&buf[..n]);
                        while let Some(frame) = framer.next_frame() {
                            match frame {
                                Ok(message) => {
                                    let _ = events.send(MasterEvent::Frame { id: id.clone(), message });
                                }
                                Err(e) => warn!(worker = %id, error = %e, "dropping malformed frame"),
                            }
                        }
                    }
                    Err(e) => {
                        debug!(worker = %id, error = %e, "read error; closing connection");
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(MasterEvent::ConnLost { id });
    writer_task.abort();
}

/// Reads frames until a `JOIN` arrives or `JOIN_TIMEOUT` elapses.
async fn read_join(stream: &mut TcpStream, framer: &mut FrameReader) -> Option<WorkerId> {
    let outcome = tokio::time::timeout(JOIN_TIMEOUT, async {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            if let Some(frame) = framer.next_frame() {
                return match frame {
                    Ok(Message::Join { msg }) => Some(WorkerId::new(msg)),
                    Ok(other) => {
                        warn!(kind = other.type_name(), "expected JOIN as the first frame");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "malformed JOIN frame");
                        None
                    }
                };
            }
            match stream.read(&mut buf).await {
                Ok(0) => return None,
                Ok(n) => framer.push_bytes(&buf[..n]),
                Err(_) => return None,
            }
        }
    })
    .await;

    outcome.unwrap_or(None)
}
