//! C7 Pending-Response Table: `map<request-id, PendingEntry>` with a
//! per-request timeout (spec.md §4.7).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tunnel_core::frame::Frame;

/// What the Edge HTTP Router converts to an HTTP response (spec.md §4.8
/// step 8).
#[derive(Debug)]
pub enum PendingOutcome {
    /// The tunnel client answered in time.
    Completed {
        status: u16,
        headers: HashMap<String, String>,
        body: String,
        is_base64_encoded: bool,
    },
    /// The per-request deadline fired first.
    Timeout,
    /// The owning control channel closed before a response arrived.
    ChannelLost,
}

struct PendingEntry {
    owner: u64,
    tx: oneshot::Sender<PendingOutcome>,
}

/// Cheaply cloneable: every clone shares the same underlying map, so a
/// clone can be moved into the timeout task spawned by `register`.
#[derive(Clone, Default)]
pub struct PendingTable {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending entry owned by `owner_channel_id`, schedule its
    /// expiry after `timeout`, and return the one-shot receiver the
    /// caller awaits.
    pub fn register(
        &self,
        id: String,
        owner_channel_id: u64,
        timeout: Duration,
    ) -> oneshot::Receiver<PendingOutcome> {
        let (tx, rx) = oneshot::channel();
        {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                id.clone(),
                PendingEntry {
                    owner: owner_channel_id,
                    tx,
                },
            );
        }

        let table = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.expire(&id);
        });

        rx
    }

    /// Deliver `frame` (a `response` frame) to the matching sink, if
    /// still present. Late responses for an id already completed or
    /// expired are discarded silently.
    pub fn complete(&self, id: &str, frame: Frame) {
        let entry = self.entries.lock().unwrap().remove(id);
        if let Some(entry) = entry {
            if let Frame::Response {
                status,
                headers,
                body,
                is_base64_encoded,
                ..
            } = frame
            {
                let _ = entry.tx.send(PendingOutcome::Completed {
                    status,
                    headers,
                    body,
                    is_base64_encoded: is_base64_encoded.unwrap_or(false),
                });
            }
        }
    }

    /// Fire the deadline for `id`: remove it (if still present) and
    /// deliver a synthetic timeout outcome. A race with `complete` or a
    /// prior `expire`/`purge` resolves to exactly one delivered outcome,
    /// since only the first to call `remove` finds the entry.
    pub fn expire(&self, id: &str) {
        if let Some(entry) = self.entries.lock().unwrap().remove(id) {
            let _ = entry.tx.send(PendingOutcome::Timeout);
        }
    }

    /// On channel close: synthesize `ChannelLost` for every entry owned
    /// by `channel_id`, then remove them. Outstanding ids routed through
    /// a closed channel become eligible for this, not for re-dispatch.
    pub fn purge(&self, channel_id: u64) {
        let mut entries = self.entries.lock().unwrap();
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.owner == channel_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(entry) = entries.remove(&id) {
                let _ = entry.tx.send(PendingOutcome::ChannelLost);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[tokio::test]
    async fn complete_delivers_response() {
        let table = PendingTable::new();
        let rx = table.register("id1".into(), 1, Duration::from_secs(5));
        table.complete(
            "id1",
            Frame::Response {
                id: "id1".into(),
                status: 200,
                headers: Map::new(),
                body: "ok".into(),
                is_base64_encoded: None,
            },
        );
        match rx.await.unwrap() {
            PendingOutcome::Completed { status, body, .. } => {
                assert_eq!(status, 200);
                assert_eq!(body, "ok");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn expire_fires_after_timeout() {
        let table = PendingTable::new();
        let rx = table.register("id2".into(), 1, Duration::from_millis(20));
        match rx.await.unwrap() {
            PendingOutcome::Timeout => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn late_response_after_purge_is_a_no_op() {
        let table = PendingTable::new();
        let rx = table.register("id3".into(), 7, Duration::from_secs(5));
        table.purge(7);
        // A late response for a purged id must be silently dropped.
        table.complete(
            "id3",
            Frame::Response {
                id: "id3".into(),
                status: 200,
                headers: Map::new(),
                body: "late".into(),
                is_base64_encoded: None,
            },
        );
        match rx.await.unwrap() {
            PendingOutcome::ChannelLost => {}
            other => panic!("expected ChannelLost, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn purge_only_affects_owning_channel() {
        let table = PendingTable::new();
        let rx_a = table.register("a".into(), 1, Duration::from_secs(5));
        let rx_b = table.register("b".into(), 2, Duration::from_secs(5));
        table.purge(1);
        assert!(matches!(rx_a.await.unwrap(), PendingOutcome::ChannelLost));
        assert_eq!(table.len(), 1);
        drop(rx_b);
    }
}
