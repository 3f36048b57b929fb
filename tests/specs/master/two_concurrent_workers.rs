//! Two pending tasks, two idle workers — a single scheduler pass pairs
//! them deterministically and both succeed.

use std::time::Duration;

use dispatch_core::TaskState;

use crate::prelude::*;

#[tokio::test]
async fn two_workers_each_complete_one_task() {
    let master = spawn_master_with_pending(&[("a.txt", "task a"), ("b.txt", "task b")]).await;

    let mut worker_a = FakeWorker::connect(master.port, "56000").await;
    let mut worker_b = FakeWorker::connect(master.port, "56001").await;

    let (_req_a, prompt_a) = worker_a.recv_request().await;
    let (_req_b, prompt_b) = worker_b.recv_request().await;

    // Each worker gets exactly one file; together they cover both.
    let mut prompts = vec![prompt_a.clone(), prompt_b.clone()];
    prompts.sort();
    assert_eq!(prompts, vec!["task a".to_string(), "task b".to_string()]);

    let file_for = |prompt: &str| if prompt == "task a" { "a.txt" } else { "b.txt" };
    worker_a.send(Message::Done { msg: file_for(&prompt_a).to_string() }).await;
    worker_b.send(Message::Done { msg: file_for(&prompt_b).to_string() }).await;

    assert!(wait_for(Duration::from_secs(2), || {
        master.store().path_for(TaskState::Done).join("a.txt").exists()
            && master.store().path_for(TaskState::Done).join("b.txt").exists()
    }));
    assert!(master.store().list(TaskState::Failed).unwrap().is_empty());
    assert!(master.store().list(TaskState::Pending).unwrap().is_empty());
    assert!(master.store().list(TaskState::Working).unwrap().is_empty());

    worker_a.close().await;
    worker_b.close().await;
}
