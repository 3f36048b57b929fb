// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: one activity that owns the worker registry and the task
//! directory, fed by a single event channel instead of guarding shared
//! state behind a lock.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use dispatch_core::clock::Clock;
use dispatch_core::id::fresh_req_id;
use dispatch_core::{ReqId, TaskState, WorkerId, WorkerStatus};
use dispatch_taskdir::TaskStore;
use dispatch_wire::Message;
use tokio::sync::mpsc;
use tokio::time as tokio_time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::WorkerRegistry;
use crate::MasterError;

/// Ack timeout for both `REQUEST` and `CHECK`.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(3);
/// Period between health-check passes.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
/// How often the deadline heap is polled for expired requests, rather than
/// spawning one thread per outstanding timeout.
const DEADLINE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Events the scheduler multiplexes: connections, frames, timer ticks, and
/// timeout expiry — expiry is folded into the deadline poll rather than
/// delivered as its own channel message.
#[derive(Debug)]
pub enum MasterEvent {
    WorkerJoined {
        id: WorkerId,
        outbox: mpsc::UnboundedSender<Message>,
    },
    Frame {
        id: WorkerId,
        message: Message,
    },
    ConnLost {
        id: WorkerId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqKind {
    Check,
    Request,
}

struct PendingReq {
    worker: WorkerId,
    kind: ReqKind,
}

pub struct Scheduler<C: Clock> {
    registry: WorkerRegistry,
    store: TaskStore,
    pending: HashMap<ReqId, PendingReq>,
    deadlines: BinaryHeap<Reverse<(Instant, ReqId)>>,
    clock: C,
    shutdown: CancellationToken,
    /// Completion is only declared after the first assignment attempt, so
    /// an empty queue at startup doesn't trigger instant shutdown.
    ever_assigned: bool,
    tick_interval: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(store: TaskStore, clock: C, shutdown: CancellationToken) -> Self {
        Self::with_tick_interval(store, clock, shutdown, HEALTH_CHECK_INTERVAL)
    }

    /// Like [`Scheduler::new`], overriding the health-check/completion tick
    /// period — an escape hatch for shrinking the fixed timer period in
    /// integration tests without touching the production default (the 10 s
    /// tick is unchanged for real deployments; `taskd-master` reads
    /// `DISPATCH_TICK_MS` at startup, see `bin/taskd_master.rs`).
    pub fn with_tick_interval(store: TaskStore, clock: C, shutdown: CancellationToken, tick_interval: Duration) -> Self {
        Self {
            registry: WorkerRegistry::new(),
            store,
            pending: HashMap::new(),
            deadlines: BinaryHeap::new(),
            clock,
            shutdown,
            ever_assigned: false,
            tick_interval,
        }
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<MasterEvent>) -> Result<(), MasterError> {
        let mut health_ticker = tokio_time::interval_at(tokio_time::Instant::now() + self.tick_interval, self.tick_interval);
        let mut deadline_ticker = tokio_time::interval(DEADLINE_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = health_ticker.tick() => {
                    if self.handle_timer_tick() {
                        break;
                    }
                }
                _ = deadline_ticker.tick() => {
                    self.expire_deadlines();
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
            }

            self.assign_pending_tasks()?;
        }

        self.shutdown_all_workers();
        Ok(())
    }

    fn handle_event(&mut self, event: MasterEvent) {
        match event {
            MasterEvent::WorkerJoined { id, outbox } => {
                info!(worker = %id, "worker joined");
                self.registry.insert(id, outbox);
            }
            MasterEvent::Frame { id, message } => self.handle_frame(id, message),
            MasterEvent::ConnLost { id } => {
                debug!(worker = %id, "connection lost");
                self.disconnect_worker(&id);
            }
        }
    }

    fn handle_frame(&mut self, id: WorkerId, message: Message) {
        match message {
            Message::RequestAck { req_id, .. } => {
                let matched = self
                    .pending
                    .get(&req_id)
                    .map(|p| p.worker == id && p.kind == ReqKind::Request)
                    .unwrap_or(false);
                if matched {
                    self.pending.remove(&req_id);
                    if let Some(worker) = self.registry.get_mut(&id) {
                        worker.status = WorkerStatus::Working;
                    }
                }
            }
            Message::CheckAck { req_id, .. } => {
                self.pending.remove(&req_id);
            }
            Message::Done { msg } => self.complete_task(&id, &msg, TaskState::Done),
            Message::Failed { msg } => self.complete_task(&id, &msg, TaskState::Failed),
            Message::UsageLimited { .. } => {
                warn!(worker = %id, "worker reported usage limit; disconnecting to requeue its task");
                self.disconnect_worker(&id);
            }
            Message::Leave { .. } => {
                info!(worker = %id, "worker left");
                self.disconnect_worker(&id);
            }
            other => warn!(worker = %id, kind = other.type_name(), "unexpected message from worker; ignoring"),
        }
    }

    fn complete_task(&mut self, id: &WorkerId, reported_name: &str, to: TaskState) {
        let assigned = self.registry.get(id).and_then(|w| w.current_task.clone());
        let filename = assigned.as_deref().unwrap_or(reported_name);

        match self.store.move_task(filename, TaskState::Working, to) {
            Ok(Some(_)) => info!(worker = %id, task = filename, state = to.dir_name(), "task completed"),
            Ok(None) => debug!(worker = %id, task = filename, "task already completed; duplicate report ignored"),
            Err(e) => error!(worker = %id, task = filename, error = %e, "failed to move completed task"),
        }

        if let Some(worker) = self.registry.get_mut(id) {
            worker.status = WorkerStatus::Idle;
            worker.current_task = None;
        }
    }

    /// Declares a worker dead or departed: requeues its in-flight task (if
    /// any) and drops its record.
    fn disconnect_worker(&mut self, id: &WorkerId) {
        let Some(record) = self.registry.remove(id) else {
            return;
        };

        if record.status.has_assignment() {
            if let Some(task) = record.current_task.as_ref() {
                match self.store.move_task(task, TaskState::Working, TaskState::Pending) {
                    Ok(Some(_)) => info!(worker = %id, task, "requeued task after disconnect"),
                    Ok(None) => debug!(worker = %id, task, "task already resolved before disconnect"),
                    Err(e) => error!(worker = %id, task, error = %e, "failed to requeue task on disconnect"),
                }
            }
        }

        self.pending.retain(|_, p| &p.worker != id);
        let _ = record.outbox.send(Message::Disconnect { msg: String::new() });
    }

    /// Returns `true` once global completion is detected.
    fn handle_timer_tick(&mut self) -> bool {
        match self.store.counts() {
            Ok(counts) if self.ever_assigned && counts.outstanding() == 0 => {
                info!("all tasks complete; beginning orderly shutdown");
                return true;
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "failed to read task counts"),
        }

        self.send_health_checks();
        false
    }

    fn send_health_checks(&mut self) {
        let ids: Vec<WorkerId> = self.registry.ids().cloned().collect();
        for id in ids {
            let req_id = fresh_req_id();
            let sent = self
                .registry
                .get(&id)
                .map(|w| {
                    w.outbox
                        .send(Message::Check {
                            msg: String::new(),
                            req_id: req_id.clone(),
                        })
                        .is_ok()
                })
                .unwrap_or(false);

            if sent {
                let deadline = self.clock.now() + ACK_TIMEOUT;
                self.pending.insert(
                    req_id.clone(),
                    PendingReq {
                        worker: id,
                        kind: ReqKind::Check,
                    },
                );
                self.deadlines.push(Reverse((deadline, req_id)));
            } else {
                warn!(worker = %id, "failed to send health check; disconnecting");
                self.disconnect_worker(&id);
            }
        }
    }

    /// Disconnects any worker whose outstanding `REQUEST`/`CHECK` has
    /// passed its deadline without an ack. `REQUEST_ACK` and `CHECK_ACK`
    /// timeouts are treated identically.
    fn expire_deadlines(&mut self) {
        let now = self.clock.now();
        loop {
            let expired = match self.deadlines.peek() {
                Some(Reverse((deadline, _))) => *deadline <= now,
                None => false,
            };
            if !expired {
                break;
            }
            let Some(Reverse((_, req_id))) = self.deadlines.pop() else {
                break;
            };

            let Some(pending) = self.pending.remove(&req_id) else {
                // Already acked; a stale heap entry.
                continue;
            };

            if self.registry.contains(&pending.worker) {
                warn!(worker = %pending.worker, "ack deadline exceeded; disconnecting");
                self.disconnect_worker(&pending.worker);
            }
        }
    }

    /// Assignment policy: pair pending files with idle workers one-to-one,
    /// in directory/registry order, until either list is exhausted.
    fn assign_pending_tasks(&mut self) -> Result<(), MasterError> {
        let pending_files = self.store.list_pending()?;
        if pending_files.is_empty() {
            return Ok(());
        }

        let idle_workers = self.registry.idle_worker_ids();
        for (filename, worker_id) in pending_files.into_iter().zip(idle_workers) {
            self.assign_one(&filename, &worker_id);
        }
        Ok(())
    }

    fn assign_one(&mut self, filename: &str, worker_id: &WorkerId) {
        self.ever_assigned = true;

        match self.store.move_task(filename, TaskState::Pending, TaskState::Working) {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                error!(task = filename, error = %e, "failed to move task to working");
                return;
            }
        }

        let prompt = match self.store.read_prompt(TaskState::Working, filename) {
            Ok(text) => text,
            Err(e) => {
                error!(task = filename, error = %e, "failed to read prompt; reverting assignment");
                let _ = self.store.move_task(filename, TaskState::Working, TaskState::Pending);
                return;
            }
        };

        let req_id = fresh_req_id();
        let sent = self
            .registry
            .get(worker_id)
            .map(|w| {
                w.outbox
                    .send(Message::Request {
                        msg: prompt,
                        req_id: req_id.clone(),
                    })
                    .is_ok()
            })
            .unwrap_or(false);

        if !sent {
            warn!(worker = %worker_id, task = filename, "failed to send request; reverting assignment");
            let _ = self.store.move_task(filename, TaskState::Working, TaskState::Pending);
            return;
        }

        if let Some(worker) = self.registry.get_mut(worker_id) {
            worker.status = WorkerStatus::Requesting;
            worker.current_task = Some(filename.to_string());
        }

        let deadline = self.clock.now() + ACK_TIMEOUT;
        self.pending.insert(
            req_id.clone(),
            PendingReq {
                worker: worker_id.clone(),
                kind: ReqKind::Request,
            },
        );
        self.deadlines.push(Reverse((deadline, req_id)));
        debug!(worker = %worker_id, task = filename, "assigned task");
    }

    /// Orderly shutdown: disconnect every remaining worker so in-flight
    /// tasks are requeued to `pending/`.
    fn shutdown_all_workers(&mut self) {
        let ids: Vec<WorkerId> = self.registry.ids().cloned().collect();
        for id in ids {
            self.disconnect_worker(&id);
        }
    }
}
