//! Wire payload types shared across the uplink pipeline.
//!
//! A [`TelemetryRecord`] pairs the client identity block with one
//! [`PositionFix`] and serializes to the canonical textual form used for
//! the snapshot file, spool entries, and live sends alike. Records are
//! transient — built per fix, consumed within one ingest cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client software version reported in every record.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One timestamped position reading from the sensor source.
///
/// Field names and defaults mirror the gpsd TPV report: every numeric
/// estimate defaults to 0 when the receiver omits it, only `mode` (the
/// fix-quality indicator, 0–3) is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
    #[serde(default)]
    pub speed: f64,
    /// Fix timestamp (UTC, ISO-8601 on the wire).
    #[serde(default = "default_fix_time")]
    pub time: DateTime<Utc>,
    /// Estimated timestamp error (seconds).
    #[serde(default)]
    pub ept: f64,
    /// Longitude error estimate (meters).
    #[serde(default)]
    pub epx: f64,
    /// Latitude error estimate (meters).
    #[serde(default)]
    pub epy: f64,
    /// Vertical error estimate (meters).
    #[serde(default)]
    pub epv: f64,
    /// Course over ground (degrees from true north).
    #[serde(default)]
    pub track: f64,
    /// Climb/sink rate (meters per second).
    #[serde(default)]
    pub climb: f64,
    /// Speed error estimate (meters per second).
    #[serde(default)]
    pub eps: f64,
    /// Fix quality mode: 0 = unknown, 1 = no fix, 2 = 2D, 3 = 3D.
    pub mode: i32,
}

/// Fallback timestamp for receivers that report a fix without time.
fn default_fix_time() -> DateTime<Utc> {
    // 1990-01-01T00:00:00Z
    DateTime::from_timestamp(631_152_000, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Client identity block attached to every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub version: String,
    pub platform: String,
    pub id: String,
}

impl ClientInfo {
    /// Build the identity block for the configured client id.
    pub fn new(client_id: &str) -> Self {
        Self {
            version: CLIENT_VERSION.to_string(),
            platform: format!(
                "{},{},{}",
                std::env::consts::FAMILY,
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            id: client_id.to_string(),
        }
    }
}

/// One position fix packaged with client identity, ready to transmit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub info: ClientInfo,
    pub position: PositionFix,
}

impl TelemetryRecord {
    pub fn new(info: ClientInfo, position: PositionFix) -> Self {
        Self { info, position }
    }

    /// Serialize to the canonical wire form: compact JSON + CRLF.
    ///
    /// The same bytes are written to the snapshot file, stored as a spool
    /// entry, and sent over the uplink. A record has no identity beyond
    /// this serialized content.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.extend_from_slice(b"\r\n");
        Ok(bytes)
    }
}
