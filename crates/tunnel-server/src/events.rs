//! C10 Observability Surface, server half: a typed broadcast of lifecycle
//! events (spec.md §4.10, §9 "expose each lifecycle as an explicit
//! channel/stream of typed events that the embedder consumes").

use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Start,
    Stop,
    Connection { channel_id: u64 },
    Disconnection { channel_id: u64 },
    Request { id: String, subdomain: String },
    Error { message: String },
}

/// Capacity of the broadcast channel: lagging subscribers drop the
/// oldest events rather than block publishers, since these are
/// observability signals, not control-plane state.
const EVENT_BUFFER: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ServerEvent) {
        // No subscribers is the common case outside of tests/embedders;
        // that's not an error.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
