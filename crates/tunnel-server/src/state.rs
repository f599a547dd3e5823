use std::sync::atomic::{AtomicU64, Ordering};

use tunnel_core::config::ServerSettings;

use crate::events::EventBus;
use crate::pending::PendingTable;
use crate::registry::Registry;
use crate::stats::Stats;

pub struct AppState {
    pub settings: ServerSettings,
    pub registry: Registry,
    pub pending: PendingTable,
    pub stats: Stats,
    pub events: EventBus,
    next_channel_id: AtomicU64,
}

impl AppState {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            settings,
            registry: Registry::new(),
            pending: PendingTable::new(),
            stats: Stats::new(),
            events: EventBus::new(),
            next_channel_id: AtomicU64::new(1),
        }
    }

    /// Unique within the lifetime of the process, used as the `owner`
    /// key in the Pending-Response Table and the registry's set.
    pub fn next_channel_id(&self) -> u64 {
        self.next_channel_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The public URL a tunnel client would be told about on `ready`
    /// (spec.md §4.9: `http[s]://{sub}.{host}`).
    pub fn public_url(&self, subdomain: &str) -> String {
        format!("https://{subdomain}.{}", self.settings.base_domain)
    }
}
