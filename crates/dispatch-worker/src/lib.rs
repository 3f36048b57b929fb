// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! dispatch-worker: the agent supervisor and protocol loop that together
//! implement one worker process.

pub mod agent_process;
pub mod events;
pub mod protocol;
pub mod supervisor;

mod error;

pub use agent_process::{AgentCommand, AgentProcess, ChildAgentProcess};
pub use error::WorkerError;
pub use events::{parse_event, AgentEvent, EventDecodeError};
pub use supervisor::{AgentSupervisor, Outcome, SupervisorCommand};

/// The environment variable whose presence forces the worker to refuse to
/// start: the agent must authenticate interactively, not via API key.
pub const API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";

/// Returns an error if [`API_KEY_ENV_VAR`] is set in the process
/// environment.
pub fn refuse_if_api_key_present() -> Result<(), WorkerError> {
    if std::env::var_os(API_KEY_ENV_VAR).is_some() {
        return Err(WorkerError::EnvironmentRefused(format!(
            "{API_KEY_ENV_VAR} is set; refusing to start (the worker authenticates \
             interactively, not via API key)"
        )));
    }
    Ok(())
}
