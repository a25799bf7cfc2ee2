// ── guardrelay Core Library ──────────────────────────────────────────────────
//
// Everything a guardrelay client needs to run a chat turn: credential
// parsing, the scanning gateway and completion backend clients, context
// policy, conversation state, configuration and logging.

pub mod backend;
pub mod config;
pub mod context;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod pipeline;
pub mod secret;

mod transport;

// Re-export the turn-level types at crate root for convenience
pub use conversation::{ChatSession, Conversation, Message, Role};
pub use pipeline::{
    Advisory, Pipeline, PipelineOptions, PipelineStage, TurnOutcome, UnreachablePolicy,
};
