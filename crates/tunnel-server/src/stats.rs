//! C10 Observability Surface, server half: `/status` and `/metrics`
//! bodies, backed by real monotonic counters (spec.md §3 "Server
//! Stats", §4.8, §6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Default)]
pub struct Stats {
    connections: AtomicU64,
    requests: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    start: Option<Instant>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            start: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, bytes_in: u64, bytes_out: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.map(|s| s.elapsed().as_secs()).unwrap_or(0)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: u64,
    pub requests: u64,
    pub uptime: String,
    pub active_subdomains: Vec<String>,
}

impl StatusResponse {
    pub fn new(stats: &Stats, active_subdomains: Vec<String>) -> Self {
        Self {
            status: "ok",
            version: VERSION,
            connections: stats.connections(),
            requests: stats.requests(),
            uptime: format!("{}s", stats.uptime_secs()),
            active_subdomains,
        }
    }
}

/// Prometheus text exposition of the four counters named in spec.md
/// §4.8/§6.
pub fn metrics_text(stats: &Stats, active_subdomains: usize) -> String {
    format!(
        "# HELP tunnel_connections_total Total control channels accepted.\n\
         # TYPE tunnel_connections_total counter\n\
         tunnel_connections_total {connections}\n\
         # HELP tunnel_requests_total Total forwarded requests.\n\
         # TYPE tunnel_requests_total counter\n\
         tunnel_requests_total {requests}\n\
         # HELP tunnel_active_subdomains Subdomains with at least one live channel.\n\
         # TYPE tunnel_active_subdomains gauge\n\
         tunnel_active_subdomains {active_subdomains}\n\
         # HELP tunnel_uptime_seconds Seconds since the server started.\n\
         # TYPE tunnel_uptime_seconds gauge\n\
         tunnel_uptime_seconds {uptime}\n",
        connections = stats.connections(),
        requests = stats.requests(),
        active_subdomains = active_subdomains,
        uptime = stats.uptime_secs(),
    )
}
