use thiserror::Error;

/// Error kinds shared by the edge server and the tunnel client.
///
/// Never crosses the control-channel boundary: every user-visible failure
/// of a forwarded request becomes an HTTP status instead (see `frame`),
/// and every lifecycle failure becomes a state transition plus an
/// observer event.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("invalid subdomain: {0}")]
    InvalidSubdomain(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("local backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
