//! Stream assembly: turns inbound content frames into transcript entries.
//!
//! A frame is either a delta (line-delimited JSON, every line an object with
//! a string `content` field) or a final message. Classification is
//! all-or-nothing over the whole frame: a single line that fails the rule
//! demotes the entire frame to a final message, it is never applied
//! per-line.

use serde_json::Value;

use crate::markdown;

/// Who a transcript entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Error,
}

/// One rendered transcript entry. While an entry is the streaming tail of
/// an open turn its `raw_text` only ever grows; it is never truncated or
/// replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub role: Role,
    pub raw_text: String,
    pub rendered_html: String,
}

/// Frame classification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Concatenated `content` payloads, in line order.
    Delta(String),
    /// The frame is one complete message; use its literal text.
    Final,
}

/// How [`StreamAssembler::ingest`] applied a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Delta,
    Final,
}

/// Classify one frame. Blank lines are skipped; every remaining line must
/// parse as a JSON object with a string `content` field for the frame to
/// count as a delta.
pub fn classify(frame: &str) -> Frame {
    let mut payload = String::new();
    for line in frame.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => return Frame::Final,
        };
        match value.get("content").and_then(Value::as_str) {
            Some(content) => payload.push_str(content),
            None => return Frame::Final,
        }
    }
    Frame::Delta(payload)
}

/// Ordered transcript plus the state of the currently streaming turn.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    messages: Vec<DisplayMessage>,
    turn_open: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&DisplayMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Apply one content frame. Deltas extend the streaming assistant
    /// message (or start one); final frames become a standalone entry with
    /// the given role and close the turn.
    pub fn ingest(&mut self, role: Role, frame: &str) -> Ingested {
        match classify(frame) {
            Frame::Delta(payload) => {
                let streaming_tail = self.turn_open
                    && matches!(self.messages.last(), Some(entry) if entry.role == Role::Assistant);
                if streaming_tail {
                    if let Some(entry) = self.messages.last_mut() {
                        entry.raw_text.push_str(&payload);
                        // Full re-render: an open fence or table can
                        // reinterpret earlier lines, so no incremental patch.
                        entry.rendered_html = markdown::render(&entry.raw_text);
                    }
                } else {
                    self.turn_open = true;
                    self.push(Role::Assistant, &payload);
                }
                Ingested::Delta
            }
            Frame::Final => {
                self.turn_open = false;
                self.push(role, frame);
                Ingested::Final
            }
        }
    }

    /// Append the outbound user message; always closes any open turn first.
    pub fn push_user(&mut self, text: &str) {
        self.turn_open = false;
        self.push(Role::User, text);
    }

    pub fn push_system(&mut self, text: &str) {
        self.push(Role::System, text);
    }

    pub fn push_error(&mut self, text: &str) {
        self.push(Role::Error, text);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.turn_open = false;
    }

    fn push(&mut self, role: Role, text: &str) {
        self.messages.push(DisplayMessage {
            role,
            raw_text: text.to_string(),
            rendered_html: markdown::render(text),
        });
    }
}
