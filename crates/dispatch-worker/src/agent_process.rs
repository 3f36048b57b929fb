// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent subprocess: spawn, feed prompts, and stream its event output.
//!
//! Separate reader tasks drain stdout and stderr into a shared channel
//! behind `Stdio::piped()`. Unlike a one-shot invocation, this process
//! survives across many requests and is fed further prompts on the same
//! stdin; only `/clear` resets its conversation context.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use crate::events::{parse_event, AgentEvent, EventDecodeError};
use crate::WorkerError;

/// How long to wait for the process to exit on its own after stdin is
/// closed before escalating to a hard kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// The command used to spawn the agent, built from CLI flags.
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// One long-lived agent subprocess, fed prompts and drained for events.
///
/// Implementors own exactly one child process for the worker's lifetime;
/// `send_prompt`/`next_event` are called in strict alternation by the
/// supervisor, since at most one request is ever in flight per process.
#[async_trait]
pub trait AgentProcess: Send {
    async fn send_prompt(&mut self, prompt: &str) -> Result<(), WorkerError>;

    /// Sends the distinguished `/clear` command that resets conversation
    /// context without terminating the process.
    async fn send_clear(&mut self) -> Result<(), WorkerError> {
        self.send_prompt("/clear").await
    }

    /// The next event from the agent's output, or `None` once both its
    /// stdout and stderr streams have closed (the process died).
    async fn next_event(&mut self) -> Option<Result<AgentEvent, EventDecodeError>>;

    /// Terminate-then-kill: close stdin and give the process
    /// [`TERMINATE_GRACE`] to exit before a hard kill.
    async fn kill(&mut self);
}

enum Line {
    Out(String),
    Err(String),
}

/// Real implementation: a `tokio::process::Child` with piped stdio.
pub struct ChildAgentProcess {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<Line>,
}

impl ChildAgentProcess {
    #[allow(clippy::expect_used)]
    pub async fn spawn(command: AgentCommand) -> Result<Self, WorkerError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(WorkerError::SpawnFailed)?;
        // Infallible: stdin/stdout/stderr were all just requested as piped above.
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (tx, rx) = mpsc::channel(256);

        let out_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if out_tx.send(Line::Out(line)).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(Line::Err(line)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            lines: rx,
        })
    }
}

#[async_trait]
impl AgentProcess for ChildAgentProcess {
    async fn send_prompt(&mut self, prompt: &str) -> Result<(), WorkerError> {
        self.stdin.write_all(prompt.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<AgentEvent, EventDecodeError>> {
        loop {
            match self.lines.recv().await {
                Some(Line::Out(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(parse_event(&line));
                }
                Some(Line::Err(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    // stderr isn't structured JSON, but the classifier
                    // still needs to scan it for a usage-limit signal.
                    return Some(Ok(AgentEvent::Error { message: line }));
                }
                None => return None,
            }
        }
    }

    async fn kill(&mut self) {
        let _ = self.stdin.shutdown().await;
        if tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await.is_err() {
            let _ = self.child.kill().await;
        }
    }
}

/// Test double driven by a scripted queue of outcomes, with the same
/// call-recording shape used to assert on the real process's side effects.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;

    enum Scripted {
        Event(AgentEvent),
        DecodeError,
        Delay(Duration),
    }

    #[derive(Default)]
    pub struct FakeAgentProcess {
        pub sent_prompts: Vec<String>,
        pub clear_count: usize,
        pub killed: bool,
        queue: VecDeque<Scripted>,
    }

    impl FakeAgentProcess {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue an event to be yielded by the next `next_event` call.
        pub fn push_event(&mut self, event: AgentEvent) -> &mut Self {
            self.queue.push_back(Scripted::Event(event));
            self
        }

        /// Queue a pause before the following queued item is yielded, for
        /// simulating a long-running agent call (e.g. a health check probe
        /// arriving mid-task).
        pub fn push_delay(&mut self, delay: Duration) -> &mut Self {
            self.queue.push_back(Scripted::Delay(delay));
            self
        }

        /// Queue a transient decode failure.
        pub fn push_decode_error(&mut self) -> &mut Self {
            self.queue.push_back(Scripted::DecodeError);
            self
        }
    }

    #[async_trait]
    impl AgentProcess for FakeAgentProcess {
        async fn send_prompt(&mut self, prompt: &str) -> Result<(), WorkerError> {
            self.sent_prompts.push(prompt.to_string());
            Ok(())
        }

        async fn send_clear(&mut self) -> Result<(), WorkerError> {
            self.clear_count += 1;
            Ok(())
        }

        #[allow(clippy::unwrap_used)]
        async fn next_event(&mut self) -> Option<Result<AgentEvent, EventDecodeError>> {
            loop {
                match self.queue.pop_front() {
                    Some(Scripted::Event(event)) => return Some(Ok(event)),
                    Some(Scripted::DecodeError) => {
                        return Some(Err(EventDecodeError {
                            // There's no public constructor for a bare serde_json::Error, so
                            // manufacture one from input guaranteed to fail to parse.
                            source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
                            raw: "{".to_string(),
                        }))
                    }
                    Some(Scripted::Delay(d)) => tokio::time::sleep(d).await,
                    // An empty queue means the scripted process has "exited".
                    None => return None,
                }
            }
        }

        async fn kill(&mut self) {
            self.killed = true;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAgentProcess;
