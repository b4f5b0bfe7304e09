//! Core contract shared by the chat session and its collaborators.
//!
//! This crate defines the user/message/event types, the session lifecycle
//! model, the message snapshot diffing rule, and common error/channel
//! abstractions.

/// Broadcast event channel primitives.
pub mod channel;
/// Stable chat error types and HTTP classification helpers.
pub mod error;
/// Message history snapshot and the event-emission rule.
pub mod snapshot;
/// Session lifecycle state machine.
pub mod state_machine;
/// Caller-facing types (users, messages, events, config).
pub mod types;

pub use channel::{EventChannelError, EventStream, SessionEvents, next_event};
pub use error::{ChatError, ChatErrorCategory, classify_http_status};
pub use snapshot::MessageSnapshot;
pub use state_machine::SessionStateMachine;
pub use types::{
    ChatEvent, ChatMessage, ChatUser, DEFAULT_EVENT_BUFFER, DEFAULT_POLL_INTERVAL,
    OverwritePolicy, SessionCommand, SessionConfig, SessionLifecycleState,
};
