//! A single pending task, one worker, a clean success.

use std::time::Duration;

use dispatch_core::TaskState;

use crate::prelude::*;

#[tokio::test]
async fn single_task_single_worker_succeeds_and_master_shuts_down() {
    let mut master = spawn_master_with_pending(&[("t001.txt", "hello")]).await;

    let mut worker = FakeWorker::connect(master.port, "55000").await;
    let (req_id, prompt) = worker.recv_request().await;
    assert_eq!(prompt, "hello");
    let _ = req_id;

    worker.send(Message::Done { msg: "t001.txt".to_string() }).await;

    assert!(wait_for(Duration::from_secs(2), || {
        master.store().path_for(TaskState::Done).join("t001.txt").exists()
    }));
    assert!(!master.store().path_for(TaskState::Pending).join("t001.txt").exists());
    assert!(!master.store().path_for(TaskState::Working).join("t001.txt").exists());

    // Completion is only declared on a timer tick (sped up for tests via
    // DISPATCH_TICK_MS, see prelude::spawn_master_with_pending).
    let status = master.wait_for_exit(Duration::from_secs(5));
    assert!(status.is_some(), "master should shut down once the queue drains");
    assert!(status.unwrap().success());

    worker.close().await;
}
