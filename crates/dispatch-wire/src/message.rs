// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The wire message type: a closed discriminated union over every frame
//! kind the protocol exchanges, in place of a dynamically-typed dict.

use dispatch_core::ReqId;
use serde::{Deserialize, Serialize};

/// One framed message exchanged between a worker and the Master.
///
/// Every variant round-trips to a JSON object carrying `type` and `msg`
/// (`msg` defaults to `""` when a variant has no payload), plus `req_id`
/// for the variants that correlate with an ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// W→M: announce worker-id (the worker's local ephemeral port).
    Join { msg: String },
    /// M→W: handshake accepted.
    JoinAck {
        #[serde(default)]
        msg: String,
    },
    /// M→W: health-check probe.
    Check {
        #[serde(default)]
        msg: String,
        req_id: ReqId,
    },
    /// W→M: health-check acknowledged.
    CheckAck {
        #[serde(default)]
        msg: String,
        req_id: ReqId,
    },
    /// M→W: assign a task; `msg` is the prompt text.
    Request { msg: String, req_id: ReqId },
    /// W→M: task assignment acknowledged.
    RequestAck {
        #[serde(default)]
        msg: String,
        req_id: ReqId,
    },
    /// W→M: task succeeded; `msg` is the task filename.
    Done { msg: String },
    /// W→M: task terminally failed; `msg` is the task filename.
    Failed { msg: String },
    /// W→M: request was suppressed by quota; `msg` is the worker-id.
    UsageLimited { msg: String },
    /// W→M: clean departure.
    Leave {
        #[serde(default)]
        msg: String,
    },
    /// M→W: instructs the worker to disconnect.
    Disconnect {
        #[serde(default)]
        msg: String,
    },
}

impl Message {
    /// The `req_id` carried by request/ack variants, if any.
    pub fn req_id(&self) -> Option<&ReqId> {
        match self {
            Message::Check { req_id, .. }
            | Message::CheckAck { req_id, .. }
            | Message::Request { req_id, .. }
            | Message::RequestAck { req_id, .. } => Some(req_id),
            _ => None,
        }
    }

    /// The message's `msg` payload.
    pub fn msg(&self) -> &str {
        match self {
            Message::Join { msg }
            | Message::JoinAck { msg }
            | Message::Check { msg, .. }
            | Message::CheckAck { msg, .. }
            | Message::Request { msg, .. }
            | Message::RequestAck { msg, .. }
            | Message::Done { msg }
            | Message::Failed { msg }
            | Message::UsageLimited { msg }
            | Message::Leave { msg }
            | Message::Disconnect { msg } => msg,
        }
    }

    /// The wire `type` tag, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Join { .. } => "JOIN",
            Message::JoinAck { .. } => "JOIN_ACK",
            Message::Check { .. } => "CHECK",
            Message::CheckAck { .. } => "CHECK_ACK",
            Message::Request { .. } => "REQUEST",
            Message::RequestAck { .. } => "REQUEST_ACK",
            Message::Done { .. } => "DONE",
            Message::Failed { .. } => "FAILED",
            Message::UsageLimited { .. } => "USAGE_LIMITED",
            Message::Leave { .. } => "LEAVE",
            Message::Disconnect { .. } => "DISCONNECT",
        }
    }
}
