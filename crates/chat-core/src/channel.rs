use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::ChatEvent;

/// Broadcast event stream type used by session subscribers.
pub type EventStream = broadcast::Receiver<ChatEvent>;

/// Errors returned by event channel operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventChannelError {
    /// The session side of the channel is gone.
    #[error("event channel is closed")]
    Closed,
    /// The subscriber fell behind and missed events.
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),
}

/// Multi-subscriber event fan-out owned by one chat session.
#[derive(Clone, Debug)]
pub struct SessionEvents {
    event_tx: broadcast::Sender<ChatEvent>,
}

impl SessionEvents {
    /// Create a channel with room for `buffer` undelivered events per subscriber.
    pub fn new(buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(buffer.max(1));
        Self { event_tx }
    }

    /// Subscribe to emitted session events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; an event with no subscribers is dropped.
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Receive the next event, folding broadcast errors into [`EventChannelError`].
pub async fn next_event(stream: &mut EventStream) -> Result<ChatEvent, EventChannelError> {
    stream.recv().await.map_err(|err| match err {
        broadcast::error::RecvError::Closed => EventChannelError::Closed,
        broadcast::error::RecvError::Lagged(missed) => EventChannelError::Lagged(missed),
    })
}
