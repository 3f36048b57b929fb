// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker registry: a plain `HashMap` owned by the scheduler activity
//! alone. Single-owner-by-construction stands in for a shared lock, since
//! only the scheduler ever touches it.

use std::collections::HashMap;

use dispatch_core::{WorkerId, WorkerStatus};
use dispatch_wire::Message;
use tokio::sync::mpsc::UnboundedSender;

/// Everything the scheduler knows about one connected worker.
pub struct WorkerRecord {
    pub status: WorkerStatus,
    /// Filename of the task currently assigned, non-empty iff
    /// `status` is `requesting` or `working`.
    pub current_task: Option<String>,
    /// Channel feeding that worker's per-connection writer task.
    pub outbox: UnboundedSender<Message>,
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, WorkerRecord>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: WorkerId, outbox: UnboundedSender<Message>) {
        self.workers.insert(
            id,
            WorkerRecord {
                status: WorkerStatus::Idle,
                current_task: None,
                outbox,
            },
        );
    }

    pub fn remove(&mut self, id: &WorkerId) -> Option<WorkerRecord> {
        self.workers.remove(id)
    }

    pub fn get(&self, id: &WorkerId) -> Option<&WorkerRecord> {
        self.workers.get(id)
    }

    pub fn get_mut(&mut self, id: &WorkerId) -> Option<&mut WorkerRecord> {
        self.workers.get_mut(id)
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &WorkerId> {
        self.workers.keys()
    }

    /// Worker-ids currently `idle`, in a stable order so assignment is
    /// deterministic per pass (pairing order need only be stable within a
    /// single pass, not fair across passes).
    pub fn idle_worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, record)| record.status.is_idle())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
