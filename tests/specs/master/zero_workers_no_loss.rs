//! With no workers connected the master keeps a non-empty pending/ queue
//! intact and retries assignment on every pass once a worker does show
//! up — no files are lost while it waits.

use std::time::Duration;

use dispatch_core::TaskState;

use crate::prelude::*;

#[tokio::test]
async fn pending_tasks_survive_with_no_workers_connected() {
    let master = spawn_master_with_pending(&[("only.txt", "eventually")]).await;

    // Give the scheduler a few idle passes with nobody to assign to.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(master.store().path_for(TaskState::Pending).join("only.txt").exists());
    assert!(master.store().list(TaskState::Working).unwrap().is_empty());

    // A worker finally joins; the very next pass picks the file up.
    let mut worker = FakeWorker::connect(master.port, "55000").await;
    let (_req_id, prompt) = worker.recv_request().await;
    assert_eq!(prompt, "eventually");

    worker.send(Message::Done { msg: "only.txt".to_string() }).await;
    assert!(wait_for(Duration::from_secs(2), || {
        master.store().path_for(TaskState::Done).join("only.txt").exists()
    }));
}
