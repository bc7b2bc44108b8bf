//! Position source abstraction.
//!
//! Provides a unified trait for consuming position-fix events, with a
//! gpsd implementation (JSON reports over TCP) for production and a
//! replay implementation for tests. The source owns protocol parsing;
//! the ingest loop only ever sees typed events.

use crate::types::PositionFix;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::warn;

/// Events produced by a position source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A genuine position report.
    Fix(PositionFix),
    /// A non-positional report (device status, satellite view, ...) —
    /// filtered out by the ingest loop.
    Skipped,
    /// The source closed the stream; the ingest setup restarts.
    Eof,
}

/// Trait abstracting where position fixes come from.
///
/// Implementations handle transport and format parsing internally. The
/// ingest loop calls [`next_event`](FixSource::next_event) in a select!
/// with cancellation.
#[async_trait]
pub trait FixSource: Send + 'static {
    /// Read the next event from the source.
    ///
    /// Returns `SourceEvent::Eof` on a clean end of stream and `Err` on
    /// protocol or transport errors; both cause a full ingest restart.
    async fn next_event(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging (e.g. "gpsd", "replay").
    fn source_name(&self) -> &str;
}

// ============================================================================
// gpsd Source (JSON reports over TCP)
// ============================================================================

/// Watch command subscribing to streamed JSON reports.
const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\r\n";

/// Streams TPV reports from a gpsd daemon.
pub struct GpsdSource {
    reader: BufReader<OwnedReadHalf>,
    /// Held so the daemon keeps the watch session open.
    _writer: OwnedWriteHalf,
    line_buffer: String,
}

impl GpsdSource {
    /// Connect to gpsd and enable the JSON watch stream.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(WATCH_COMMAND).await?;

        Ok(Self {
            reader: BufReader::new(read_half),
            _writer: write_half,
            line_buffer: String::with_capacity(1024),
        })
    }
}

#[async_trait]
impl FixSource for GpsdSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        self.line_buffer.clear();
        let bytes = self.reader.read_line(&mut self.line_buffer).await?;
        if bytes == 0 {
            return Ok(SourceEvent::Eof);
        }
        Ok(parse_report(&self.line_buffer))
    }

    fn source_name(&self) -> &str {
        "gpsd"
    }
}

/// Source factory used by the ingest loop's restart boundary.
///
/// A trait seam so tests can drive the restart loop with a scripted
/// connector instead of a live gpsd daemon.
#[async_trait]
pub trait SourceConnect: Send + Sync + 'static {
    /// Establish one fresh subscription.
    async fn subscribe(&self) -> Result<Box<dyn FixSource>>;
}

/// Subscribes to a gpsd daemon on each attempt.
pub struct GpsdConnect {
    addr: String,
}

impl GpsdConnect {
    pub fn new(addr: String) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl SourceConnect for GpsdConnect {
    async fn subscribe(&self) -> Result<Box<dyn FixSource>> {
        let source = GpsdSource::connect(&self.addr)
            .await
            .with_context(|| format!("gpsd at {}", self.addr))?;
        Ok(Box::new(source))
    }
}

/// Parse one gpsd report line into a source event.
///
/// Only `class == "TPV"` reports become fixes; everything else —
/// VERSION, DEVICES, SKY, malformed lines — is skipped. Malformed
/// lines are logged and never abort the stream.
pub(crate) fn parse_report(line: &str) -> SourceEvent {
    let line = line.trim();
    if line.is_empty() {
        return SourceEvent::Skipped;
    }

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Skipping malformed report line");
            return SourceEvent::Skipped;
        }
    };

    if value.get("class").and_then(|c| c.as_str()) != Some("TPV") {
        return SourceEvent::Skipped;
    }

    match serde_json::from_value::<PositionFix>(value) {
        Ok(fix) => SourceEvent::Fix(fix),
        Err(e) => {
            warn!(error = %e, "Skipping TPV report with unusable fields");
            SourceEvent::Skipped
        }
    }
}

// ============================================================================
// Replay Source (pre-built events, tests and offline replay)
// ============================================================================

/// Yields a pre-built sequence of events, then `Eof`.
pub struct ReplaySource {
    events: std::vec::IntoIter<SourceEvent>,
}

impl ReplaySource {
    pub fn new(events: Vec<SourceEvent>) -> Self {
        Self {
            events: events.into_iter(),
        }
    }

    /// Convenience: a source yielding the given fixes in order.
    pub fn from_fixes(fixes: Vec<PositionFix>) -> Self {
        Self::new(fixes.into_iter().map(SourceEvent::Fix).collect())
    }
}

#[async_trait]
impl FixSource for ReplaySource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        Ok(self.events.next().unwrap_or(SourceEvent::Eof))
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
