//! Frames arriving back-to-back with no newline separator must still
//! decode as two independent messages. The codec is shared by both peers,
//! so this exercises the Master's receive side directly: a fake worker
//! writes a JOIN immediately followed by a LEAVE with no separator in a
//! single `write_all`, and the master must still process both in order.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::prelude::*;

#[tokio::test]
async fn join_then_leave_with_no_separator_both_decode() {
    let master = spawn_master_with_pending(&[]).await;

    let mut stream = TcpStream::connect(("127.0.0.1", master.port)).await.expect("connect");
    let join = serde_json::to_string(&Message::Join { msg: "57000".to_string() }).expect("encode join");
    let leave = serde_json::to_string(&Message::Leave { msg: String::new() }).expect("encode leave");
    let joined = format!("{join}{leave}\n");
    stream.write_all(joined.as_bytes()).await.expect("write concatenated frames");

    // The LEAVE (treated as a disconnect) should close out the
    // worker's record cleanly; the master keeps running since it still has
    // no pending work and hasn't attempted any assignment yet. We only
    // assert the master is still alive and accepting connections, which it
    // wouldn't be if the concatenated JOIN+LEAVE had desynchronized the
    // frame reader or crashed the connection handler.
    assert!(wait_for(Duration::from_secs(2), || {
        std::net::TcpStream::connect(("127.0.0.1", master.port)).is_ok()
    }));
}
