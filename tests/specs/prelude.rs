//! Test helpers for behavioral specifications.
//!
//! Black-box against the two real binaries (`taskd-master`, `taskd-worker`):
//! spawn the binary as a child process, then speak the wire protocol
//! over a plain TCP connection to stand in for the other side.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

pub use dispatch_core::{ReqId, TaskState};
pub use dispatch_taskdir::TaskStore;
pub use dispatch_wire::{encode, FrameReader, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Returns the path to a binary built alongside the test harness.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // Fallback: resolve relative to the test binary itself. The test
    // binary lives at target/debug/deps/specs-<hash>, so its grandparent
    // is target/debug/ where the two taskd binaries are built.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

pub fn master_binary() -> PathBuf {
    binary_path("taskd-master")
}

pub fn worker_binary() -> PathBuf {
    binary_path("taskd-worker")
}

/// An OS-assigned free port, for tests that need to pick one before
/// spawning the master (there's an inherent race between choosing the
/// port and the master binding it, but daemon-socket tests elsewhere in
/// this style commonly accept the same race).
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

/// A running `taskd-master` child process plus the task directory it was
/// pointed at. Killed on drop so a failing assertion never leaves an
/// orphaned listener behind.
pub struct MasterProcess {
    child: Child,
    pub root: tempfile::TempDir,
    pub port: u16,
}

impl MasterProcess {
    pub fn store(&self) -> TaskStore {
        TaskStore::new(self.root.path().join(".tasks"))
    }

    /// Blocks (briefly) until the process has exited on its own, for
    /// asserting orderly shutdown after global completion.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Option<std::process::ExitStatus> {
        let start = std::time::Instant::now();
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Some(status);
            }
            if start.elapsed() > timeout {
                return None;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for MasterProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawns `taskd-master` against a fresh temp root with the given pending
/// tasks pre-populated, and waits for its listening socket to come up.
pub async fn spawn_master_with_pending(tasks: &[(&str, &str)]) -> MasterProcess {
    let root = tempfile::tempdir().expect("tempdir");
    let store = TaskStore::new(root.path().join(".tasks"));
    store.ensure_directories().expect("ensure dirs");
    for (name, content) in tasks {
        std::fs::write(store.path_for(TaskState::Pending).join(name), content).expect("write task");
    }

    let port = free_port();
    let child = Command::new(master_binary())
        .arg(port.to_string())
        .arg("--root-dir")
        .arg(root.path())
        // Shrinks the 10s health-check/completion tick so specs that wait
        // for orderly shutdown don't each cost double digits of seconds;
        // production deployments never set this.
        .env("DISPATCH_TICK_MS", "300")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn taskd-master");

    wait_for_port(port, Duration::from_secs(5)).await;

    MasterProcess { child, root, port }
}

async fn wait_for_port(port: u16, budget: Duration) {
    let start = std::time::Instant::now();
    loop {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        if start.elapsed() > budget {
            panic!("taskd-master never started listening on {port}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A hand-rolled worker connection: speaks the wire protocol directly so
/// tests can script exact sequences (ack-then-vanish, ack-then-usage-limit,
/// ...) that a real agent subprocess would be awkward to drive.
pub struct FakeWorker {
    stream: TcpStream,
    framer: FrameReader,
}

impl FakeWorker {
    pub async fn connect(port: u16, worker_id: &str) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect to master");
        let mut worker = Self {
            stream,
            framer: FrameReader::new(),
        };
        worker
            .send(Message::Join {
                msg: worker_id.to_string(),
            })
            .await;
        let ack = worker.recv().await;
        assert_eq!(ack, Message::JoinAck { msg: String::new() });
        worker
    }

    pub async fn send(&mut self, message: Message) {
        self.stream.write_all(&encode(&message)).await.expect("write frame");
    }

    /// Reads the next complete frame, waiting (bounded) for more bytes if
    /// the buffer doesn't already hold one.
    pub async fn recv(&mut self) -> Message {
        self.recv_within(Duration::from_secs(5)).await.expect("expected a frame")
    }

    pub async fn recv_within(&mut self, budget: Duration) -> Option<Message> {
        timeout(budget, async {
            loop {
                if let Some(frame) = self.framer.next_frame() {
                    return frame.expect("well-formed frame");
                }
                let mut buf = [0u8; 4096];
                let n = self.stream.read(&mut buf).await.expect("read");
                if n == 0 {
                    panic!("connection closed while awaiting a frame");
                }
                self.framer.push_bytes(&buf[..n]);
            }
        })
        .await
        .ok()
    }

    /// Acks whatever `REQUEST` arrives next, returning its req_id and
    /// prompt text.
    pub async fn recv_request(&mut self) -> (ReqId, String) {
        match self.recv().await {
            Message::Request { msg, req_id } => {
                self.send(Message::RequestAck {
                    msg: String::new(),
                    req_id: req_id.clone(),
                })
                .await;
                (req_id, msg)
            }
            other => panic!("expected REQUEST, got {other:?}"),
        }
    }

    pub async fn close(self) {
        drop(self.stream);
    }
}

/// Polls `condition` until it's true or `budget` elapses.
pub fn wait_for<F: FnMut() -> bool>(budget: Duration, mut condition: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < budget {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}
