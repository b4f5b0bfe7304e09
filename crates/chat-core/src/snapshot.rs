use crate::types::{ChatEvent, ChatMessage, OverwritePolicy, SessionConfig};

/// Last message history seen by the poll loop, diffed against each fetch.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    messages: Vec<ChatMessage>,
    primed: bool,
    overwrite_policy: OverwritePolicy,
    replay_history: bool,
}

impl MessageSnapshot {
    pub fn new(overwrite_policy: OverwritePolicy, replay_history: bool) -> Self {
        Self {
            messages: Vec::new(),
            primed: false,
            overwrite_policy,
            replay_history,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.overwrite_policy, config.replay_history)
    }

    /// Forget the recorded history; the next observation becomes the first one.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.primed = false;
    }

    /// Record `fetched` and decide which event, if any, this tick raises.
    ///
    /// A history of exactly one line written by `current_user` raises
    /// `OverwriteLastLine`. Any other change that brings new content raises
    /// `NewMessage` carrying that content.
    pub fn observe(&mut self, fetched: Vec<ChatMessage>, current_user: &str) -> Option<ChatEvent> {
        let first = !self.primed;
        let changed = first || self.messages != fetched;
        let previous = std::mem::replace(&mut self.messages, fetched);
        self.primed = true;

        if let [only] = self.messages.as_slice()
            && only.is_from(current_user)
        {
            let raise = changed || self.overwrite_policy == OverwritePolicy::EveryTick;
            return raise.then(|| ChatEvent::OverwriteLastLine {
                message: only.clone(),
            });
        }

        if !changed || self.messages.is_empty() {
            return None;
        }
        if first && !self.replay_history {
            return None;
        }

        let fresh = if self.messages.starts_with(&previous) {
            self.messages[previous.len()..].to_vec()
        } else if previous.starts_with(&self.messages) {
            // Truncated history carries nothing new.
            Vec::new()
        } else {
            self.messages.clone()
        };

        (!fresh.is_empty()).then_some(ChatEvent::NewMessage { messages: fresh })
    }
}

impl Default for MessageSnapshot {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}
