// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent supervisor: the dedicated loop that owns the worker's one
//! long-lived agent subprocess and classifies its results.

use std::time::Duration;

use dispatch_core::{ReqId, WorkerId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent_process::AgentProcess;

/// Work handed to the supervisor by the protocol loop.
#[derive(Debug)]
pub enum SupervisorCommand {
    Request {
        prompt: String,
        req_id: ReqId,
        task_filename: String,
    },
    Exit,
}

/// A classified result handed back to the protocol loop for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done { task_filename: String },
    Failed { task_filename: String },
    UsageLimited { worker_id: WorkerId },
}

/// Transient event-decode failures are retried this many times before the
/// request is declared `FAILED`.
const MAX_DECODE_RETRIES: u32 = 3;

fn decode_backoff(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1)))
}

pub struct AgentSupervisor<A: AgentProcess> {
    agent: A,
    worker_id: WorkerId,
    inbox: mpsc::UnboundedReceiver<SupervisorCommand>,
    outbox: mpsc::UnboundedSender<Outcome>,
}

impl<A: AgentProcess> AgentSupervisor<A> {
    pub fn new(
        agent: A,
        worker_id: WorkerId,
        inbox: mpsc::UnboundedReceiver<SupervisorCommand>,
        outbox: mpsc::UnboundedSender<Outcome>,
    ) -> Self {
        Self {
            agent,
            worker_id,
            inbox,
            outbox,
        }
    }

    /// Drains the inbox until `Exit` or the process dies mid-request.
    ///
    /// Serial by construction: only one `Request` is processed at a time,
    /// since the inbox is only polled again once the previous request's
    /// outcome has been reported — at most one request is ever in flight
    /// per supervisor.
    pub async fn run(mut self) {
        while let Some(command) = self.inbox.recv().await {
            match command {
                SupervisorCommand::Exit => {
                    info!("supervisor received EXIT");
                    self.agent.kill().await;
                    break;
                }
                SupervisorCommand::Request {
                    prompt,
                    req_id,
                    task_filename,
                } => {
                    let (outcome, process_died) = self.run_request(prompt, req_id, task_filename).await;
                    let _ = self.outbox.send(outcome);
                    if process_died {
                        warn!("agent process died mid-request; supervisor terminating");
                        break;
                    }
                }
            }
        }
    }

    /// Runs one request to completion, returning its outcome and whether
    /// the agent process itself died (in which case the caller must stop
    /// the supervisor entirely).
    async fn run_request(&mut self, prompt: String, req_id: ReqId, task_filename: String) -> (Outcome, bool) {
        if let Err(e) = self.agent.send_prompt(&prompt).await {
            warn!(%req_id, error = %e, "failed to write prompt to agent");
            return (Outcome::Failed { task_filename }, true);
        }

        let mut usage_limited = false;
        let mut decode_failures = 0u32;
        let (outcome, died) = loop {
            match self.agent.next_event().await {
                None => {
                    break (Outcome::Failed { task_filename: task_filename.clone() }, true);
                }
                Some(Ok(event)) => {
                    decode_failures = 0;
                    if event.mentions_usage_limit() {
                        usage_limited = true;
                    }
                    if event.is_turn_end() {
                        let outcome = if usage_limited {
                            Outcome::UsageLimited {
                                worker_id: self.worker_id.clone(),
                            }
                        } else {
                            Outcome::Done {
                                task_filename: task_filename.clone(),
                            }
                        };
                        break (outcome, false);
                    }
                }
                Some(Err(e)) => {
                    decode_failures += 1;
                    warn!(%req_id, error = %e, attempt = decode_failures, "failed to decode agent event");
                    if decode_failures > MAX_DECODE_RETRIES {
                        break (Outcome::Failed { task_filename: task_filename.clone() }, false);
                    }
                    tokio::time::sleep(decode_backoff(decode_failures)).await;
                }
            }
        };

        if !died {
            // Unconditional: clear context before the next request
            // regardless of outcome.
            if let Err(e) = self.agent.send_clear().await {
                debug!(%req_id, error = %e, "failed to send /clear after request");
            }
        }

        (outcome, died)
    }
}
