//! C6 Subdomain Registry: `map<subdomain, ordered set<ControlChannel>>`
//! with round-robin dispatch (spec.md §4.6).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tunnel_core::frame::Frame;
use tunnel_ws::FrameWriter;

/// A single control channel as seen by the registry: its send path plus
/// a liveness flag re-checked on every `pick`.
pub struct ChannelHandle {
    pub id: u64,
    writer: FrameWriter,
    closed: AtomicBool,
}

impl ChannelHandle {
    pub fn new(id: u64, writer: FrameWriter) -> Arc<Self> {
        Arc::new(Self {
            id,
            writer,
            closed: AtomicBool::new(false),
        })
    }

    /// Send a frame on this channel's dedicated write path. Returns
    /// `false` (and marks the channel closed) if the writer has already
    /// exited.
    pub fn send(&self, frame: Frame) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.writer.send(frame) {
            Ok(()) => true,
            Err(_) => {
                self.mark_closed();
                false
            }
        }
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// `map<subdomain, ordered set<ControlChannel>>`. Keys are present iff
/// the set is non-empty (spec.md §3).
#[derive(Default)]
pub struct Registry {
    tunnels: DashMap<String, Mutex<VecDeque<Arc<ChannelHandle>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `channel` into the set at `subdomain`; creates the key if
    /// absent.
    pub fn add(&self, subdomain: &str, channel: Arc<ChannelHandle>) {
        self.tunnels
            .entry(subdomain.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()))
            .lock()
            .unwrap()
            .push_back(channel);
    }

    /// Remove `channel_id` from the set at `subdomain`; deletes the key
    /// if the set empties. Never fails.
    pub fn remove(&self, subdomain: &str, channel_id: u64) {
        let became_empty = match self.tunnels.get(subdomain) {
            Some(entry) => {
                let mut set = entry.lock().unwrap();
                set.retain(|c| c.id != channel_id);
                set.is_empty()
            }
            None => return,
        };
        if became_empty {
            self.tunnels.remove(subdomain);
        }
    }

    /// Pick a live channel bound to `subdomain`, rotating so consecutive
    /// picks distribute across holders. Skips (and drops) any channel
    /// found closed along the way, per spec.md §4.6.
    pub fn pick(&self, subdomain: &str) -> Option<Arc<ChannelHandle>> {
        let entry = self.tunnels.get(subdomain)?;
        let mut set = entry.lock().unwrap();
        let attempts = set.len();
        for _ in 0..attempts {
            let candidate = set.pop_front()?;
            if candidate.is_closed() {
                continue;
            }
            set.push_back(candidate.clone());
            return Some(candidate);
        }
        None
    }

    /// Subdomains currently bound to at least one live channel.
    pub fn snapshot(&self) -> Vec<String> {
        self.tunnels.iter().map(|e| e.key().clone()).collect()
    }

    pub fn total_connections(&self) -> usize {
        self.tunnels.iter().map(|e| e.value().lock().unwrap().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u64) -> Arc<ChannelHandle> {
        let (writer, _rx) = FrameWriter::for_testing();
        ChannelHandle::new(id, writer)
    }

    #[test]
    fn add_remove_and_snapshot() {
        let registry = Registry::new();
        assert!(registry.snapshot().is_empty());

        registry.add("demo", handle(1));
        assert_eq!(registry.snapshot(), vec!["demo".to_string()]);
        assert_eq!(registry.total_connections(), 1);

        registry.remove("demo", 1);
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.total_connections(), 0);
    }

    #[test]
    fn pick_round_robins_across_holders() {
        let registry = Registry::new();
        registry.add("demo", handle(1));
        registry.add("demo", handle(2));

        let first = registry.pick("demo").unwrap().id;
        let second = registry.pick("demo").unwrap().id;
        assert_ne!(first, second);
        let third = registry.pick("demo").unwrap().id;
        assert_eq!(first, third);
    }

    #[test]
    fn pick_skips_and_drops_closed_channels() {
        let registry = Registry::new();
        let stale = handle(1);
        stale.mark_closed();
        registry.add("demo", stale);
        registry.add("demo", handle(2));

        let picked = registry.pick("demo").unwrap();
        assert_eq!(picked.id, 2);
        // the stale entry should not come back on a second pick
        let picked_again = registry.pick("demo").unwrap();
        assert_eq!(picked_again.id, 2);
    }

    #[test]
    fn pick_on_unknown_subdomain_is_none() {
        let registry = Registry::new();
        assert!(registry.pick("nope").is_none());
    }

    #[test]
    fn pick_returns_none_when_all_closed() {
        let registry = Registry::new();
        let stale = handle(1);
        stale.mark_closed();
        registry.add("demo", stale);
        assert!(registry.pick("demo").is_none());
    }
}
