//! Message domain types.
//!
//! A session's conversation is an append-only ordered sequence of messages.
//! Messages flow into the pipeline (user turn) and out of it (assistant
//! answer), and are what providers receive as LLM input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Find the most recent user message in an ordered history.
pub fn last_user_content(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Compare VER and NOR at Monza");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Compare VER and NOR at Monza");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::assistant("VER was 0.2s faster on average.");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, msg.content);
        assert_eq!(deserialized.role, Role::Assistant);
    }

    #[test]
    fn last_user_content_skips_assistant_messages() {
        let messages = vec![
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("second question"),
            Message::assistant("second answer"),
        ];
        assert_eq!(last_user_content(&messages), Some("second question"));
    }

    #[test]
    fn last_user_content_empty_history() {
        assert_eq!(last_user_content(&[]), None);
    }
}
