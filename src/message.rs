//! Chat messages and conversation history.

use serde::{Deserialize, Serialize};

/// The role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Splice prior conversation into freshly rendered messages.
///
/// Order: the rendered system messages, then `history` without its own
/// system messages, then the rendered non-system messages.
pub fn splice_history(rendered: Vec<Message>, history: &[Message]) -> Vec<Message> {
    let (system, rest): (Vec<Message>, Vec<Message>) =
        rendered.into_iter().partition(|m| m.role == Role::System);
    let mut out = system;
    out.extend(history.iter().filter(|m| m.role != Role::System).cloned());
    out.extend(rest);
    out
}

/// Flatten messages into a single completion-style prompt.
///
/// Each message becomes `role: content` on its own block, and the prompt
/// ends with an open `assistant:` turn.
pub fn to_prompt(messages: &[Message]) -> String {
    let mut prompt = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str("assistant:");
    prompt
}
