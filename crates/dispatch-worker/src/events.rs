// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing and classification of the agent's newline-delimited JSON event
//! stream. Field extraction stays tolerant and field-by-field (a small
//! `get_str` helper, matching on `message.get("type")`) rather than a
//! strict derived struct, since the upstream agent's event schema isn't
//! ours to define.

use dispatch_core::contains_usage_limit_signal;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("malformed agent event: {source}")]
pub struct EventDecodeError {
    #[source]
    pub source: serde_json::Error,
    pub raw: String,
}

/// One event parsed from the agent's output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A `system` event (startup banner, tool registration, etc).
    System,
    /// An `assistant` event: the turn's text/tool-use content plus an
    /// optional stop reason. A non-null stop reason marks turn end.
    Assistant {
        text: Vec<String>,
        tool_uses: Vec<String>,
        stop_reason: Option<String>,
    },
    /// A `tool_result` event; content is not otherwise inspected.
    ToolResult,
    /// An `error` event surfaced by the agent itself.
    Error { message: String },
    /// Any other `type` value. Preserved only for logging.
    Other(String),
}

impl AgentEvent {
    /// True once this event signals the assistant's turn has ended: any
    /// assistant event whose stop reason is non-null.
    pub fn is_turn_end(&self) -> bool {
        matches!(self, AgentEvent::Assistant { stop_reason: Some(_), .. })
    }

    /// True if this event's text carries a usage/rate-limit signal.
    pub fn mentions_usage_limit(&self) -> bool {
        match self {
            AgentEvent::Assistant { text, .. } => {
                text.iter().any(|t| contains_usage_limit_signal(t))
            }
            AgentEvent::Error { message } => contains_usage_limit_signal(message),
            _ => false,
        }
    }
}

fn get_str<'a>(obj: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// Parse one line of the agent's stdout into an [`AgentEvent`].
pub fn parse_event(line: &str) -> Result<AgentEvent, EventDecodeError> {
    let json: serde_json::Value = serde_json::from_str(line).map_err(|source| EventDecodeError {
        source,
        raw: line.to_string(),
    })?;

    let kind = get_str(&json, "type").unwrap_or("");
    Ok(match kind {
        "system" => AgentEvent::System,
        "tool_result" => AgentEvent::ToolResult,
        "error" => {
            let message = get_str(&json, "message")
                .map(String::from)
                .or_else(|| json.get("error").and_then(|v| v.as_str()).map(String::from))
                .unwrap_or_default();
            AgentEvent::Error { message }
        }
        "assistant" => parse_assistant(&json),
        other => AgentEvent::Other(other.to_string()),
    })
}

fn parse_assistant(json: &serde_json::Value) -> AgentEvent {
    let message = json.get("message");
    let stop_reason = message
        .and_then(|m| m.get("stop_reason"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let mut text = Vec::new();
    let mut tool_uses = Vec::new();
    if let Some(content) = message.and_then(|m| m.get("content")).and_then(|c| c.as_array()) {
        for block in content {
            match get_str(block, "type") {
                Some("text") => {
                    if let Some(t) = get_str(block, "text") {
                        text.push(t.to_string());
                    }
                }
                Some("tool_use") => {
                    if let Some(name) = get_str(block, "name") {
                        tool_uses.push(name.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    AgentEvent::Assistant {
        text,
        tool_uses,
        stop_reason,
    }
}
