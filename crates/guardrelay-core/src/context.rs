//! Context policy: what is transmitted upstream for a turn.
//!
//! The policy only shapes the scan and completion payloads. The displayed
//! conversation always keeps every turn regardless of mode.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::conversation::{Conversation, Message};

/// Which messages are sent to the gateway and the backend.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ContextMode {
    /// Send only the new message. Prior turns cannot push a benign message
    /// over the scanner's threshold, but the backend has no memory.
    #[default]
    SingleMessage,
    /// Send the whole conversation plus the new message, in turn order.
    FullHistory,
}

/// The payload chosen by the context policy for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    Single(Message),
    History(Vec<Message>),
}

impl UpstreamPayload {
    pub fn messages(&self) -> &[Message] {
        match self {
            Self::Single(message) => std::slice::from_ref(message),
            Self::History(messages) => messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }

    /// Role/content pairs in the OpenAI chat shape shared by the gateway
    /// and the backend.
    pub fn to_chat_messages(&self) -> Vec<Value> {
        self.messages()
            .iter()
            .map(|m| json!({ "role": m.role.as_ref(), "content": m.content }))
            .collect()
    }
}

/// Select the upstream payload for `new_message` under `mode`.
pub fn build_upstream_payload(
    mode: ContextMode,
    history: &Conversation,
    new_message: &Message,
) -> UpstreamPayload {
    match mode {
        ContextMode::SingleMessage => UpstreamPayload::Single(new_message.clone()),
        ContextMode::FullHistory => {
            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.extend(history.iter().cloned());
            messages.push(new_message.clone());
            UpstreamPayload::History(messages)
        }
    }
}
