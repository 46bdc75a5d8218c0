//! Wire protocol types for the gateway WebSocket. One JSON object per
//! frame; server events carry a `type` discriminator, client messages are
//! either typed control requests or a bare user payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → server: start a fresh session.
#[derive(Debug, Clone, Serialize)]
pub struct InitMessage {
    #[serde(rename = "type")]
    pub typ: &'static str,
}

impl InitMessage {
    pub fn new() -> Self {
        Self { typ: "init" }
    }
}

impl Default for InitMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Client → server: reattach to a prior session.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeMessage<'a> {
    #[serde(rename = "type")]
    pub typ: &'static str,
    pub session_id: &'a str,
}

impl<'a> ResumeMessage<'a> {
    pub fn new(session_id: &'a str) -> Self {
        Self {
            typ: "resume",
            session_id,
        }
    }
}

/// Client → server: user message. Carries no `type` field on the wire; the
/// routing overrides are only serialized when selected.
#[derive(Debug, Clone, Serialize)]
pub struct UserMessage<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
}

impl<'a> UserMessage<'a> {
    pub fn new(content: &'a str, provider: Option<&'a str>, model: Option<&'a str>) -> Self {
        Self {
            content,
            provider,
            model,
        }
    }
}

/// Server → client: connection acknowledged.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedEvent {
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Server → client: prior session reattached.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumedEvent {
    pub history_length: u64,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Server → client: content frame. The content may itself be a
/// line-delimited JSON delta stream (see the stream module).
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    pub content: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Server → client: error report.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One server event; discriminator is the JSON `type` field. Unrecognized
/// types are kept whole for generic display rather than rejected.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Connected(ConnectedEvent),
    Resumed(ResumedEvent),
    Message(MessageEvent),
    Error(ErrorEvent),
    Other { typ: String, raw: Value },
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        let typ = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or("missing type")?;
        match typ {
            "connected" => serde_json::from_value(value.clone())
                .map(ServerEvent::Connected)
                .map_err(|e| e.to_string()),
            "resumed" => serde_json::from_value(value.clone())
                .map(ServerEvent::Resumed)
                .map_err(|e| e.to_string()),
            "message" => serde_json::from_value(value.clone())
                .map(ServerEvent::Message)
                .map_err(|e| e.to_string()),
            "error" => serde_json::from_value(value.clone())
                .map(ServerEvent::Error)
                .map_err(|e| e.to_string()),
            _ => Ok(ServerEvent::Other {
                typ: typ.to_string(),
                raw: value.clone(),
            }),
        }
    }

    /// Session identifier carried by this event, whatever its kind.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerEvent::Connected(ev) => ev.session_id.as_deref(),
            ServerEvent::Resumed(ev) => ev.session_id.as_deref(),
            ServerEvent::Message(ev) => ev.session_id.as_deref(),
            ServerEvent::Error(ev) => ev.session_id.as_deref(),
            ServerEvent::Other { raw, .. } => raw.get("session_id").and_then(Value::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_serialize_with_type_tags() {
        assert_eq!(
            serde_json::to_string(&InitMessage::new()).unwrap(),
            r#"{"type":"init"}"#
        );
        assert_eq!(
            serde_json::to_string(&ResumeMessage::new("s-1")).unwrap(),
            r#"{"type":"resume","session_id":"s-1"}"#
        );
    }

    #[test]
    fn user_message_skips_absent_routing() {
        assert_eq!(
            serde_json::to_string(&UserMessage::new("hi", None, None)).unwrap(),
            r#"{"content":"hi"}"#
        );
        assert_eq!(
            serde_json::to_string(&UserMessage::new("hi", Some("ollama"), Some("llama3"))).unwrap(),
            r#"{"content":"hi","provider":"ollama","model":"llama3"}"#
        );
    }

    #[test]
    fn unknown_event_type_is_kept_for_display() {
        let event = ServerEvent::parse(r#"{"type":"ping","session_id":"s-2"}"#).unwrap();
        match &event {
            ServerEvent::Other { typ, .. } => assert_eq!(typ, "ping"),
            other => panic!("expected Other, got {other:?}"),
        }
        assert_eq!(event.session_id(), Some("s-2"));
    }

    #[test]
    fn untyped_frame_is_a_parse_error() {
        assert!(ServerEvent::parse(r#"{"content":"x"}"#).is_err());
        assert!(ServerEvent::parse("not json").is_err());
    }
}
