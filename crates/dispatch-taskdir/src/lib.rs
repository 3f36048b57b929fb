// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dispatch-taskdir: the on-disk task queue.
//!
//! A task is a plain file holding a prompt. Its state is entirely
//! positional — which of the four subdirectories it currently lives in
//! (`pending/`, `working/`, `done/`, `failed/`) — so a crash leaves no
//! ambiguous state behind: whatever directory the file is sitting in when
//! the process comes back up is its state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use dispatch_core::TaskState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Counts of tasks in each state, used to detect global completion
/// (`pending == 0 && working == 0`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: usize,
    pub working: usize,
    pub done: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn outstanding(&self) -> usize {
        self.pending + self.working
    }
}

/// Handle to a task directory rooted at `root`.
///
/// Cheap to clone (it's one `PathBuf`), so the scheduler and its helpers can
/// each hold an independent handle without sharing mutable state; the
/// Master is still the only party that ever calls its mutating methods.
#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, state: TaskState) -> PathBuf {
        self.root.join(state.dir_name())
    }

    /// Create all four state directories if they don't already exist.
    pub fn ensure_directories(&self) -> Result<(), StoreError> {
        for state in TaskState::all() {
            let dir = self.path_for(state);
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// List task filenames currently in `pending/`, in a stable order.
    pub fn list_pending(&self) -> Result<Vec<String>, StoreError> {
        self.list(TaskState::Pending)
    }

    /// List task filenames currently in `state`, sorted for determinism.
    pub fn list(&self, state: TaskState) -> Result<Vec<String>, StoreError> {
        let dir = self.path_for(state);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
            if entry.path().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a task file's prompt text.
    pub fn read_prompt(&self, state: TaskState, filename: &str) -> Result<String, StoreError> {
        let path = self.path_for(state).join(filename);
        fs::read_to_string(&path).map_err(|source| StoreError::Io { path, source })
    }

    /// Count tasks in each of the four states.
    pub fn counts(&self) -> Result<TaskCounts, StoreError> {
        Ok(TaskCounts {
            pending: self.list(TaskState::Pending)?.len(),
            working: self.list(TaskState::Working)?.len(),
            done: self.list(TaskState::Done)?.len(),
            failed: self.list(TaskState::Failed)?.len(),
        })
    }

    /// Atomically move a task file from one state directory to another.
    ///
    /// Returns `Ok(None)` if the source file is already gone — a worker
    /// reporting `DONE`/`FAILED` twice for the same task is tolerated as a
    /// no-op rather than an error (the Master only trusts the first report).
    pub fn move_task(
        &self,
        filename: &str,
        from: TaskState,
        to: TaskState,
    ) -> Result<Option<PathBuf>, StoreError> {
        let src = self.path_for(from).join(filename);
        let dst = self.path_for(to).join(filename);

        if !src.exists() {
            debug!(filename, from = from.dir_name(), "task already moved; skipping");
            return Ok(None);
        }

        fs::rename(&src, &dst).map_err(|source| StoreError::Io { path: src, source })?;
        Ok(Some(dst))
    }
}
