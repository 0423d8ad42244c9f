//! Wire frames exchanged with the chat broker.
//!
//! The broker speaks JSON, one document per WebSocket text frame. Chat
//! payloads travel inside `Send`/`Message` frames as opaque strings; the
//! transport never inspects them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames sent from client to broker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { id: Uuid, destination: String },
    Unsubscribe { id: Uuid },
    Send { destination: String, body: String },
    Ping,
}

/// Frames sent from broker to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message { destination: String, body: String },
    Error { code: String, message: String },
    Pong,
}

impl ServerFrame {
    pub fn message(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Message {
            destination: destination.into(),
            body: body.into(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
