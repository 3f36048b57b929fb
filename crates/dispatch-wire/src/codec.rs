// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame decoding: newline-delimited JSON as the primary path, with a
//! balanced-brace fallback splitter for peers that concatenate JSON objects
//! without a separator.

use std::collections::VecDeque;

use crate::Message;

/// A frame that failed to decode. The caller logs it and keeps the
/// connection open rather than treating it as fatal.
#[derive(Debug, thiserror::Error)]
#[error("malformed frame: {source}")]
pub struct FrameError {
    #[source]
    pub source: serde_json::Error,
    /// The raw text that failed to parse, for logging.
    pub raw: String,
}

/// Serialize one message to its newline-terminated wire form.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(message).unwrap_or_default();
    bytes.push(b'\n');
    bytes
}

/// Incrementally decodes a byte stream into [`Message`]s.
///
/// Owns a growable buffer; bytes arrive via [`push_bytes`](Self::push_bytes)
/// and complete frames are drained one at a time via
/// [`next_frame`](Self::next_frame). A line that fails to parse as a single
/// JSON object is retried as a run of back-to-back JSON objects (the legacy
/// concatenation case); only if that also fails is it surfaced as a
/// [`FrameError`].
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
    queued: VecDeque<Vec<u8>>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-received bytes to the internal buffer.
    ///
    /// Bytes are held raw, not decoded, until a complete line is found —
    /// a multi-byte UTF-8 sequence split across two `read()`s must not be
    /// mangled by decoding each chunk independently.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop and parse the next complete frame, if one is available.
    ///
    /// Returns `None` when the buffer holds no full frame yet (more bytes
    /// are needed). A malformed frame is still consumed and returned as
    /// `Some(Err(_))` so the caller can log-and-continue.
    pub fn next_frame(&mut self) -> Option<Result<Message, FrameError>> {
        loop {
            if let Some(raw) = self.queued.pop_front() {
                return Some(parse(raw));
            }

            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                let trimmed = trim_ascii_whitespace(&line[..line.len() - 1]);
                if trimmed.is_empty() {
                    continue;
                }
                self.queue_line(trimmed.to_vec());
                continue;
            }

            // No newline yet. A peer using the legacy concatenation format
            // may still hand us one or more complete `{...}` objects with
            // no separator at all; pull out whatever is already whole and
            // leave the rest buffered for more bytes.
            let (objects, consumed) = split_balanced_prefix(&self.buf);
            if objects.is_empty() {
                return None;
            }
            self.buf.drain(..consumed);
            self.queued.extend(objects);
        }
    }

    fn queue_line(&mut self, line: Vec<u8>) {
        if serde_json::from_slice::<Message>(&line).is_ok() {
            self.queued.push_back(line);
            return;
        }
        let (objects, consumed) = split_balanced_prefix(&line);
        if objects.is_empty() || consumed != line.len() {
            // Not recoverable as concatenated JSON either; surface the
            // original line so the caller's error mentions the real input.
            self.queued.push_back(line);
        } else {
            self.queued.extend(objects);
        }
    }
}

/// Parses one complete frame from raw bytes. `serde_json::from_slice`
/// validates UTF-8 as part of parsing, so a frame that isn't valid UTF-8
/// surfaces as an ordinary malformed-frame error rather than needing a
/// separate decode step first.
fn parse(raw: Vec<u8>) -> Result<Message, FrameError> {
    serde_json::from_slice(&raw).map_err(|source| FrameError {
        source,
        raw: String::from_utf8_lossy(&raw).into_owned(),
    })
}

/// Trims leading/trailing ASCII whitespace (including `\r`) from a byte
/// slice without requiring it to be valid UTF-8 first.
fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Scans `bytes` for a run of top-level, brace-balanced `{...}` objects,
/// stopping at the first byte that isn't part of a complete object.
///
/// Returns the objects found and how many bytes were consumed. Tracks
/// brace depth with a quoted-string-aware scan so a literal `{` or `}`
/// inside a string payload never perturbs the count. Operates on raw
/// bytes rather than `char`s: braces and quotes are single ASCII bytes,
/// and UTF-8 continuation bytes never collide with them, so scanning
/// byte-by-byte is safe even with a multi-byte sequence straddling the
/// buffer boundary.
fn split_balanced_prefix(bytes: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut objects = Vec::new();
    let mut depth: i32 = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    let mut consumed = 0;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(from) = start.take() {
                        let end = i + 1;
                        objects.push(bytes[from..end].to_vec());
                        consumed = end;
                    }
                } else if depth < 0 {
                    // Unbalanced input; stop, keep whatever we already found.
                    return (objects, consumed);
                }
            }
            _ => {}
        }
    }

    (objects, consumed)
}
