use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-level session lifecycle state reported to subscribers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionLifecycleState {
    /// No user identity is held.
    LoggedOut,
    /// A login or account creation call is in flight.
    Authenticating,
    /// A user identity is held but the poll loop is not running.
    Authenticated,
    /// The poll loop is running for the current user.
    Connected,
    /// Session was disposed; every further command is rejected.
    Disposed,
}

/// Identity returned by the user service on login or account creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatUser {
    /// Display name, also used as the author of outgoing messages.
    pub name: String,
    /// Opaque session/auth context handed out by the user service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ChatUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// One line of chat history as served by the message service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Name of the user who wrote the message.
    pub author: String,
    /// Message text.
    #[serde(rename = "message")]
    pub body: String,
    /// Time the message was written.
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message stamped with the current time.
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self::at(author, body, Utc::now())
    }

    pub fn at(
        author: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            timestamp,
        }
    }

    pub fn is_from(&self, user_name: &str) -> bool {
        self.author == user_name
    }
}

/// Commands validated by the session lifecycle state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionCommand {
    /// Verify credentials with the user service.
    Login,
    /// Register a new account with the user service.
    CreateUser,
    /// Start the poll loop.
    Connect,
    /// Stop the poll loop and release the current user.
    Disconnect,
    /// Send a message as the current user.
    SendMessage,
    /// Tear the session down for good.
    Dispose,
}

/// Whether an unchanged single own message keeps re-raising `OverwriteLastLine`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Raise once when the snapshot changes into the single own line.
    #[default]
    Once,
    /// Raise on every tick while the history is the single own line.
    EveryTick,
}

/// Tuning values for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between two poll ticks.
    pub poll_interval: Duration,
    /// Re-raise policy for `OverwriteLastLine`.
    pub overwrite_policy: OverwritePolicy,
    /// Deliver the history found at connect time as a `NewMessage`.
    ///
    /// When `false` the first tick only records the baseline.
    pub replay_history: bool,
    /// Capacity of the broadcast event channel.
    pub event_buffer: usize,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_EVENT_BUFFER: usize = 256;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            overwrite_policy: OverwritePolicy::default(),
            replay_history: true,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl SessionConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_overwrite_policy(mut self, overwrite_policy: OverwritePolicy) -> Self {
        self.overwrite_policy = overwrite_policy;
        self
    }

    pub fn with_replay_history(mut self, replay_history: bool) -> Self {
        self.replay_history = replay_history;
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    /// Poll interval clamped to at least one millisecond.
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(1))
    }
}

/// Event channel output emitted by a chat session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatEvent {
    /// Session lifecycle transition.
    StateChanged {
        /// New lifecycle state.
        state: SessionLifecycleState,
    },
    /// New content arrived since the previous tick.
    NewMessage {
        /// Messages to render, oldest first as returned by the service.
        messages: Vec<ChatMessage>,
    },
    /// The history is exactly one line written by the logged-in user.
    OverwriteLastLine {
        /// That line.
        message: ChatMessage,
    },
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn message_uses_wire_field_names() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let message = ChatMessage::at("Usuario3", "Test", timestamp);

        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["author"], "Usuario3");
        assert_eq!(json["message"], "Test");
        assert_eq!(json["date"], "2024-05-01T12:30:00Z");

        let back: ChatMessage = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, message);
    }

    #[test]
    fn user_token_is_optional_on_the_wire() {
        let user: ChatUser = serde_json::from_str(r#"{"name":"Usuario1"}"#).expect("parse");
        assert_eq!(user, ChatUser::new("Usuario1"));

        let json = serde_json::to_string(&ChatUser::new("Usuario1")).expect("serialize");
        assert_eq!(json, r#"{"name":"Usuario1"}"#);
    }

    #[test]
    fn poll_interval_never_drops_to_zero() {
        let config = SessionConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(config.effective_poll_interval(), Duration::from_millis(1));
        assert_eq!(
            SessionConfig::default().effective_poll_interval(),
            DEFAULT_POLL_INTERVAL
        );
    }
}
