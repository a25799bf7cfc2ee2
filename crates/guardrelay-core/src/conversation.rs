//! Conversation state for one chat session.
//!
//! The conversation is append-only during a session. The only way to drop
//! messages is an explicit history wipe, which replaces it with an empty
//! sequence and clears the turn log alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::TurnOutcome;

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single chat message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered, append-only message history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Per-session state owned by the UI collaborator: the displayed
/// conversation plus one `TurnOutcome` per submitted message.
///
/// Only the pipeline appends to either, after a turn completes.
#[derive(Debug, Default)]
pub struct ChatSession {
    conversation: Conversation,
    turns: Vec<TurnOutcome>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn turns(&self) -> &[TurnOutcome] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&TurnOutcome> {
        self.turns.last()
    }

    /// Wipe the conversation and the turn log.
    pub fn clear_history(&mut self) {
        self.conversation = Conversation::new();
        self.turns.clear();
    }

    pub(crate) fn record(
        &mut self,
        user: Message,
        assistant: Option<Message>,
        outcome: TurnOutcome,
    ) -> &TurnOutcome {
        self.conversation.push(user);
        if let Some(reply) = assistant {
            self.conversation.push(reply);
        }
        let index = self.turns.len();
        self.turns.push(outcome);
        &self.turns[index]
    }
}
