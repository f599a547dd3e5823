//! C5 Client State Machine states (spec.md §4.5).

/// One of the five states a tunnel client occupies at any instant.
/// Transitions are driven entirely by [`crate::client::TunnelClient::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}
