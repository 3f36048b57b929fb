// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dispatch-core: shared identifiers, clock abstraction, and error types
//! used by every other crate in the task-dispatch workspace.

pub mod clock;
pub mod id;
pub mod worker_status;

pub use clock::{Clock, FakeClock, SystemClock};
pub use id::ReqId;
pub use worker_status::WorkerStatus;

/// A worker's stable identity: the local ephemeral port it dialed out from.
///
/// The worker mints this itself and echoes it in `JOIN`; the Master
/// never assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The four task states, realized as directories under `.tasks/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Working,
    Done,
    Failed,
}

impl TaskState {
    /// The directory name this state is stored under.
    pub fn dir_name(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Working => "working",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }

    pub fn all() -> [TaskState; 4] {
        [
            TaskState::Pending,
            TaskState::Working,
            TaskState::Done,
            TaskState::Failed,
        ]
    }
}

/// Case-insensitive substrings that indicate the agent was suppressed by
/// quota. Includes a pair of localized synonyms alongside the
/// plain-English phrases.
pub const USAGE_LIMIT_SUBSTRINGS: &[&str] = &[
    "usage limit",
    "rate limit",
    "api rate limit",
    "api usage limit",
    "\u{9650}\u{5ea6}",
    "\u{5236}\u{9650}",
];

/// True if `text` contains any of [`USAGE_LIMIT_SUBSTRINGS`], case-insensitively.
pub fn contains_usage_limit_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    USAGE_LIMIT_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}
