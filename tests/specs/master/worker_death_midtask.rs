//! A worker acks a REQUEST, then its socket dies before it reports
//! anything. The master must detect this on the next CHECK timeout,
//! requeue the task, and drop the worker's record.

use std::time::Duration;

use dispatch_core::TaskState;

use crate::prelude::*;

#[tokio::test]
async fn worker_death_after_ack_requeues_the_task() {
    let master = spawn_master_with_pending(&[("t002.txt", "do something")]).await;

    let mut worker = FakeWorker::connect(master.port, "55001").await;
    worker.recv_request().await;
    // Simulate the worker vanishing: its socket is dropped without a
    // LEAVE and without a DONE/FAILED report.
    worker.close().await;

    // The ack-timeout-or-CHECK path reclaims the task within a couple of
    // tick periods.
    assert!(wait_for(Duration::from_secs(5), || {
        master.store().path_for(TaskState::Pending).join("t002.txt").exists()
    }));
    assert!(!master.store().path_for(TaskState::Working).join("t002.txt").exists());
}

#[tokio::test]
async fn a_second_worker_picks_up_the_requeued_task() {
    let master = spawn_master_with_pending(&[("t003.txt", "retry me")]).await;

    {
        let mut first = FakeWorker::connect(master.port, "55002").await;
        first.recv_request().await;
        first.close().await;
    }

    assert!(wait_for(Duration::from_secs(5), || {
        master.store().path_for(TaskState::Pending).join("t003.txt").exists()
    }));

    let mut second = FakeWorker::connect(master.port, "55003").await;
    let (_req_id, prompt) = second.recv_request().await;
    assert_eq!(prompt, "retry me");
    second.send(Message::Done { msg: "t003.txt".to_string() }).await;

    assert!(wait_for(Duration::from_secs(2), || {
        master.store().path_for(TaskState::Done).join("t003.txt").exists()
    }));
}
