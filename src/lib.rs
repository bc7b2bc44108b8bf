//! Tracklink: durable GPS position uplink
//!
//! Continuously forwards position fixes from a local gpsd to a remote
//! collector over a persistent mutually-authenticated TLS connection,
//! spooling records to disk across outages.
//!
//! ## Architecture
//!
//! - **Ingest Loop**: fix stream -> record -> snapshot -> live send, with
//!   spool fallback on any delivery failure
//! - **Connection Supervisor**: owns the single outbound connection slot,
//!   reconnects on a fixed interval
//! - **Spool**: on-disk durable queue, atomic one-file-per-record writes
//! - **Resend Worker**: periodically drains the spool through the same
//!   connection slot

pub mod config;
pub mod ingest;
pub mod register;
pub mod resend;
pub mod snapshot;
pub mod source;
pub mod spool;
pub mod types;
pub mod uplink;

// Re-export the pipeline surface
pub use config::TrackerConfig;
pub use ingest::IngestLoop;
pub use source::{FixSource, GpsdConnect, GpsdSource, ReplaySource, SourceConnect, SourceEvent};
pub use spool::{Spool, SpoolEntry, SpoolError};
pub use types::{ClientInfo, PositionFix, TelemetryRecord};

// Re-export the uplink surface
pub use uplink::{SendError, TlsUplinkConnector, UplinkConnect, UplinkSlot, UplinkTransport};
