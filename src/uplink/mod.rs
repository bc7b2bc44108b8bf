//! Uplink — the single outbound authenticated connection.
//!
//! - [`UplinkSlot`]: synchronized cell holding the current transport
//! - [`TlsUplinkConnector`]: mutual-TLS connection factory
//! - [`run_supervisor`]: fixed-interval reconnect loop

pub mod slot;
pub mod supervisor;
pub mod tls;

pub use slot::{SendError, UplinkSlot, UplinkTransport};
pub use supervisor::{run_supervisor, RECONNECT_INTERVAL, STARTUP_GRACE};
pub use tls::{TlsUplinkConnector, UplinkConnect};
