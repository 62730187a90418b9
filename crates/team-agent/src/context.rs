//! Conversation message types.
//!
//! An agent's conversation history is an append-only list of [`Message`]s.
//! Only `user` and `assistant` turns are stored; system instructions are
//! rebuilt for every request and handed to the backend separately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions/context).
    System,
    /// User message.
    User,
    /// Assistant (agent) message.
    Assistant,
}

impl MessageRole {
    /// Wire name used by every supported backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: MessageRole,

    /// Text content of the message.
    pub content: String,

    /// Timestamp when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message with the current timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Kind of input handed to an agent.
///
/// Only [`MessageKind::Task`] starts a new top-level task, which records the
/// task text and clears the agent's error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A new top-level task (user input or a transfer hand-off).
    Task,
    /// Results of invocations the agent requested.
    FunctionResults,
    /// Coordinator resuming after a worker handed control back.
    Resume,
}

impl MessageKind {
    /// Whether this input begins a new top-level task.
    pub fn is_new_task(&self) -> bool {
        matches!(self, Self::Task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("weather in Paris");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.content, "weather in Paris");

        let assistant = Message::assistant("Looking it up");
        assert_eq!(assistant.role, MessageRole::Assistant);

        let system = Message::system("Be brief");
        assert_eq!(system.role.to_string(), "system");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_message_kind() {
        assert!(MessageKind::Task.is_new_task());
        assert!(!MessageKind::FunctionResults.is_new_task());
        assert!(!MessageKind::Resume.is_new_task());
    }
}
