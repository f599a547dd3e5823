pub mod backoff;
pub mod config;
pub mod error;
pub mod frame;
pub mod subdomain;

pub use error::{Result, TunnelError};
pub use frame::Frame;
