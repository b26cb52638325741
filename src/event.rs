//! Socket lifecycle events
//!
//! The four observable lifecycle signals a transport emits, plus the
//! retry notifications the relay itself produces.

use serde::Serialize;
use serde_json::{json, Value};

/// The four lifecycle slots a transport exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Connection established
    Open,
    /// Inbound message delivered
    Message,
    /// Transport-reported error
    Error,
    /// Connection closed
    Close,
}

impl Lifecycle {
    /// Name used for event bus emission
    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Open => "open",
            Lifecycle::Message => "message",
            Lifecycle::Error => "error",
            Lifecycle::Close => "close",
        }
    }

    /// Canonical store target (`"SOCKET_" + NAME`)
    pub fn canonical(self) -> &'static str {
        match self {
            Lifecycle::Open => "SOCKET_OPEN",
            Lifecycle::Message => "SOCKET_MESSAGE",
            Lifecycle::Error => "SOCKET_ERROR",
            Lifecycle::Close => "SOCKET_CLOSE",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Message body delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageData {
    /// Textual frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

/// A raw socket event as republished on the bus and (by default) to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SocketEvent {
    /// The transport reached its open state
    Opened,
    /// An inbound message arrived
    MessageReceived { data: MessageData },
    /// The transport reported an error
    Errored { message: String },
    /// The transport closed
    Closed {
        code: Option<u16>,
        reason: String,
    },
    /// A reconnect attempt is starting
    ReconnectAttempt { attempt: u32 },
    /// Retry attempts are exhausted; no further reconnects will happen
    ReconnectFailed,
}

impl SocketEvent {
    /// Textual message data, if this event carries any
    pub fn text(&self) -> Option<&str> {
        match self {
            SocketEvent::MessageReceived {
                data: MessageData::Text(text),
            } => Some(text),
            _ => None,
        }
    }

    /// Payload forwarded to the store when no translation applies.
    ///
    /// Retry notifications carry their bare value (attempt count /
    /// terminal marker); everything else forwards the serialized event.
    pub fn raw_payload(&self) -> Value {
        match self {
            SocketEvent::ReconnectAttempt { attempt } => json!(attempt),
            SocketEvent::ReconnectFailed => json!(true),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }
}
