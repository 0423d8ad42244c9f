//! Chat message envelope exchanged by gate callers.
//!
//! The gate and transport treat message bodies as opaque strings; these
//! types are what callers serialize into those bodies and parse back out of
//! subscription callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of chat room event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// A regular chat message
    Chat,
    /// A participant entered the room
    Join,
    /// A participant left the room
    Leave,
}

/// Identity of the message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

/// Envelope for chat room traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub sender: SenderInfo,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A regular chat message timestamped now.
    pub fn new(content: impl Into<String>, sender: SenderInfo) -> Self {
        Self {
            content: content.into(),
            sender,
            message_type: MessageType::Chat,
            created_at: Utc::now(),
        }
    }

    /// A join announcement for `sender`.
    pub fn join(sender: SenderInfo) -> Self {
        Self {
            content: String::new(),
            sender,
            message_type: MessageType::Join,
            created_at: Utc::now(),
        }
    }

    /// A leave announcement for `sender`.
    pub fn leave(sender: SenderInfo) -> Self {
        Self {
            content: String::new(),
            sender,
            message_type: MessageType::Leave,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sender() -> SenderInfo {
        SenderInfo {
            id: "42".to_string(),
            username: "ada".to_string(),
            full_name: "Ada Lovelace".to_string(),
        }
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let message = ChatMessage::new("hi", test_sender());
        let json = serde_json::to_string(&message).unwrap();

        assert!(json.contains(r#""messageType":"CHAT""#));
        assert!(json.contains(r#""createdAt""#));
        assert!(json.contains(r#""fullName":"Ada Lovelace""#));
    }

    #[test]
    fn test_parse_inbound_envelope() {
        let json = r#"{
            "content": "hello room",
            "sender": {"id": "7", "username": "bob", "fullName": "Bob Barker"},
            "messageType": "CHAT",
            "createdAt": "2024-03-01T12:00:00Z"
        }"#;

        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.content, "hello room");
        assert_eq!(message.sender.username, "bob");
        assert_eq!(message.message_type, MessageType::Chat);
    }

    #[test]
    fn test_join_and_leave_have_empty_content() {
        let join = ChatMessage::join(test_sender());
        assert_eq!(join.message_type, MessageType::Join);
        assert!(join.content.is_empty());

        let leave = ChatMessage::leave(test_sender());
        assert_eq!(leave.message_type, MessageType::Leave);
    }
}
