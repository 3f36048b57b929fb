//! A worker reports USAGE_LIMITED. The master's response is to disconnect
//! the worker via the standard path, which requeues its assigned task back
//! to pending/.

use std::time::Duration;

use dispatch_core::TaskState;

use crate::prelude::*;

#[tokio::test]
async fn usage_limited_report_requeues_the_assigned_task() {
    let master = spawn_master_with_pending(&[("t005.txt", "write an essay")]).await;

    let mut worker = FakeWorker::connect(master.port, "55000").await;
    worker.recv_request().await;
    worker.send(Message::UsageLimited { msg: "55000".to_string() }).await;

    assert!(wait_for(Duration::from_secs(2), || {
        master.store().path_for(TaskState::Pending).join("t005.txt").exists()
    }));
    assert!(!master.store().path_for(TaskState::Working).join("t005.txt").exists());

    worker.close().await;
}
