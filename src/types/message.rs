use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Heading prefix used whenever reasoning is appended to an answer.
pub const REASONING_LABEL: &str = "💡 Reasoning:";

/// The author of a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// The person at the terminal.
    User,
    /// The model.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Error returned when parsing an invalid role string.
#[derive(Debug)]
pub struct RoleParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown role: {}", self.invalid_value)
    }
}

impl std::error::Error for RoleParseError {}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(RoleParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// One complete entry in a conversation.
///
/// Messages are only ever recorded whole: a streamed answer becomes a
/// `Message` after its final chunk arrives, never before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// The primary text.
    pub content: String,
    /// Secondary reasoning trace, for backends that expose one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning: Option<String>,
}

impl Message {
    /// Create a new message with no reasoning.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            reasoning: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message; empty reasoning is dropped.
    pub fn assistant(content: impl Into<String>, reasoning: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            reasoning: reasoning.filter(|r| !r.is_empty()),
        }
    }

    /// The content with any reasoning appended, as transcripts show it.
    pub fn transcript_content(&self) -> String {
        match &self.reasoning {
            Some(reasoning) if self.role == Role::Assistant => {
                format!("{}\n\n{REASONING_LABEL}\n{reasoning}", self.content)
            }
            _ => self.content.clone(),
        }
    }
}

/// Returns the messages after the leading system message.
pub fn conversation_turns(history: &[Message]) -> &[Message] {
    match history.first() {
        Some(first) if first.role == Role::System => &history[1..],
        _ => history,
    }
}
