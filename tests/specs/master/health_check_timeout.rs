//! An ack deadline that expires disconnects the worker and requeues its
//! task — exercised here via a CHECK that a worker simply never acks
//! (rather than a vanished socket, which the listener detects via TCP
//! EOF before any timeout fires at all).

use std::time::Duration;

use dispatch_core::TaskState;

use crate::prelude::*;

#[tokio::test]
async fn a_check_left_unacked_past_its_deadline_disconnects_the_worker() {
    let master = spawn_master_with_pending(&[("t006.txt", "hello")]).await;

    let mut worker = FakeWorker::connect(master.port, "55000").await;
    worker.recv_request().await;

    // Wait for a CHECK to arrive and then simply never answer it. The
    // connection itself must be held open (unlike the vanished-socket
    // scenario) so only the ack-timeout path, not TCP EOF, can explain the
    // eventual requeue.
    let check = worker.recv().await;
    assert!(matches!(check, Message::Check { .. }), "expected a CHECK probe");

    assert!(wait_for(Duration::from_secs(5), || {
        master.store().path_for(TaskState::Pending).join("t006.txt").exists()
    }));

    worker.close().await;
}
