pub mod client;
pub mod events;
pub mod fetcher;
pub mod state;

pub use client::TunnelClient;
pub use events::{ClientEvent, EventBus};
pub use state::ClientState;
