//! Incremental parser for the backend's `data:` line protocol.
//!
//! The streaming endpoint sends one event per line:
//!
//! ```text
//! data: {"content": "Once upon"}
//! data: {"content": " a time"}
//! data: {"done": true}
//! ```
//!
//! A payload carrying a non-null `error` (string, `{"message": ..}` object or
//! any other value) ends the stream with an error; a truthy `done` or the
//! literal `[DONE]` ends it normally. Transport chunks may split lines
//! and multi-byte characters anywhere, so the parser buffers both.

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::LlmError;

/// Maximum size for buffers before the stream is aborted.
pub const MAX_BUFFER: usize = 16 * 1024 * 1024; // 16 MiB

const DATA_PREFIX: &str = "data:";

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of generated text.
    Fragment(String),
    /// Normal end of stream.
    Done,
    /// The provider failed mid-stream.
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment(_))
    }
}

/// Turns arbitrary byte chunks into [`StreamEvent`]s.
#[derive(Debug)]
pub struct FrameParser {
    line: String,
    utf8: Vec<u8>,
    terminated: bool,
    max_buffer: usize,
    dropped: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Parser with the default 16 MiB buffer cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_buffer(MAX_BUFFER)
    }

    /// Parser with a custom buffer cap.
    #[must_use]
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            line: String::new(),
            utf8: Vec::new(),
            terminated: false,
            max_buffer,
            dropped: 0,
        }
    }

    /// Whether a terminal event has been emitted.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of malformed payloads dropped so far.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Feed one transport chunk. Returns the events completed by it, in order.
    /// At most one terminal event is ever returned; input after it is ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        self.utf8.extend_from_slice(chunk);
        self.drain_utf8();

        let mut events = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let line: String = self.line.drain(..=pos).collect();
            self.parse_line(line.trim_end_matches(['\n', '\r']), &mut events);
            if self.terminated {
                self.line.clear();
                self.utf8.clear();
                return events;
            }
        }

        if self.line.len() > self.max_buffer || self.utf8.len() > self.max_buffer {
            self.line.clear();
            self.utf8.clear();
            self.terminated = true;
            events.push(StreamEvent::Error(format!(
                "stream line exceeded {} bytes",
                self.max_buffer
            )));
        }
        events
    }

    /// Flush at end of input.
    ///
    /// Parses a trailing line that lacked a newline; if the stream still has
    /// no terminal event, ends it with `Done`. Returns nothing when a terminal
    /// event was already emitted.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }
        // Incomplete multi-byte sequence at end of input.
        if !self.utf8.is_empty() {
            let tail = String::from_utf8_lossy(&self.utf8).into_owned();
            self.line.push_str(&tail);
            self.utf8.clear();
        }

        let mut events = Vec::new();
        let line = std::mem::take(&mut self.line);
        self.parse_line(line.trim_end_matches('\r'), &mut events);
        if !self.terminated {
            self.terminate(&mut events, StreamEvent::Done);
        }
        events
    }

    /// Move every complete UTF-8 character from the byte buffer into the line
    /// buffer. Invalid bytes are replaced; an incomplete tail is kept.
    fn drain_utf8(&mut self) {
        loop {
            match std::str::from_utf8(&self.utf8) {
                Ok(text) => {
                    self.line.push_str(text);
                    self.utf8.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.line
                        .push_str(&String::from_utf8_lossy(&self.utf8[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            self.line.push(char::REPLACEMENT_CHARACTER);
                            self.utf8.drain(..valid + bad);
                        }
                        None => {
                            self.utf8.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn parse_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            if !line.trim().is_empty() {
                trace!(line, "Ignoring non-data line");
            }
            return;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload).trim_end();

        if payload == "[DONE]" {
            self.terminate(events, StreamEvent::Done);
            return;
        }

        let frame = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(frame)) => frame,
            Ok(other) => return self.drop_payload(&format!("expected an object, got {other}"), payload.len()),
            Err(e) => return self.drop_payload(&e.to_string(), payload.len()),
        };

        if let Some(message) = frame.get("error").and_then(error_message) {
            self.terminate(events, StreamEvent::Error(message));
            return;
        }
        if let Some(text) = frame.get("content").and_then(content_text) {
            events.push(StreamEvent::Fragment(text));
        }
        if frame.get("done").is_some_and(truthy) {
            self.terminate(events, StreamEvent::Done);
        }
    }

    fn drop_payload(&mut self, reason: &str, payload_len: usize) {
        self.dropped += 1;
        let err = LlmError::MalformedStreamPayload(reason.to_string());
        warn!(error = %err, payload_len, "Dropping stream line");
    }

    fn terminate(&mut self, events: &mut Vec<StreamEvent>, event: StreamEvent) {
        self.terminated = true;
        events.push(event);
    }
}

// ---------------------------------------------------------------------------
// Payload fields
// ---------------------------------------------------------------------------

/// `null` and `false` mean "no error"; anything else is a failure.
fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => Some("provider reported an error".to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => Some(
            obj.get("message")
                .and_then(Value::as_str)
                .map_or_else(|| value.to_string(), str::to_string),
        ),
        other => Some(other.to_string()),
    }
}

fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
