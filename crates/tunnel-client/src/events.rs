//! C10 Observability Surface, client half (spec.md §4.10): the lifecycle
//! events a tunnel client emits for the embedding program to consume.

use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected { subdomain: String, url: String },
    Disconnected,
    Reconnecting { attempt: u32, delay_ms: u64 },
    Request { id: String },
    Response { id: String, status: u16 },
    Error { message: String },
    Close,
}

const EVENT_BUFFER: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
