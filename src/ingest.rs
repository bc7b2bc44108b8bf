//! Ingest loop — the live-send/spool-fallback path.
//!
//! Consumes the position-fix stream, builds a telemetry record per fix,
//! persists the latest record to the snapshot file, then attempts a
//! live send through the connection slot. Any failure to deliver — no
//! connection, or a transport error mid-send — drops the record into
//! the spool for the resend worker.
//!
//! The outermost recovery boundary lives here too: if the source itself
//! fails, the whole ingest setup is re-subscribed from scratch after a
//! fixed delay. This is the only place a full restart occurs.

use crate::snapshot::write_snapshot;
use crate::source::{FixSource, SourceConnect, SourceEvent};
use crate::spool::Spool;
use crate::types::{ClientInfo, PositionFix, TelemetryRecord};
use crate::uplink::{SendError, UplinkSlot};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed delay before re-subscribing after a source failure.
pub const SOURCE_RESTART_DELAY: Duration = Duration::from_secs(10);

/// Per-fix processing state shared by every ingest cycle.
pub struct IngestLoop {
    identity: ClientInfo,
    slot: Arc<UplinkSlot>,
    spool: Arc<Spool>,
    snapshot_path: PathBuf,
}

impl IngestLoop {
    pub fn new(
        identity: ClientInfo,
        slot: Arc<UplinkSlot>,
        spool: Arc<Spool>,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            identity,
            slot,
            spool,
            snapshot_path,
        }
    }

    /// Process one genuine position fix: record, snapshot, live send or
    /// spool fallback. Never fails — every error is handled locally.
    pub async fn process_fix(&self, fix: PositionFix) {
        let record = TelemetryRecord::new(self.identity.clone(), fix);
        let payload = match record.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Could not serialize record — fix dropped");
                return;
            }
        };

        // Best-effort: a local snapshot failure never blocks delivery.
        if let Err(e) = write_snapshot(&self.snapshot_path, &payload) {
            warn!(error = %e, "Failed to write snapshot file");
        }

        match self.slot.send(&payload).await {
            Ok(()) => {
                debug!("Record sent live");
            }
            Err(SendError::NotConnected) => {
                debug!("No uplink — spooling record");
                self.spool_record(&payload);
            }
            Err(SendError::Transport(e)) => {
                // The slot has already invalidated itself.
                warn!(error = %e, "Live send failed — spooling record");
                self.spool_record(&payload);
            }
        }
    }

    fn spool_record(&self, payload: &[u8]) {
        if let Err(e) = self.spool.enqueue(payload) {
            warn!(error = %e, "Failed to spool record — fix dropped");
        }
    }

    /// Consume a subscribed source until cancellation, end of stream,
    /// or a source error.
    ///
    /// `Ok(())` means cancelled; `Err` means the source needs a full
    /// re-subscribe (handled by [`run_ingest`]).
    pub async fn run<S: FixSource + ?Sized>(
        &self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let event = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = source.next_event() => result?,
            };

            match event {
                SourceEvent::Fix(fix) => self.process_fix(fix).await,
                SourceEvent::Skipped => {}
                SourceEvent::Eof => {
                    anyhow::bail!("position source closed the stream");
                }
            }
        }
    }
}

/// Run the ingest loop indefinitely, re-subscribing from scratch after
/// [`SOURCE_RESTART_DELAY`] whenever the source fails. The delay is
/// fixed; a source that stays down is retried forever.
pub async fn run_ingest<C: SourceConnect>(
    ingest: IngestLoop,
    connector: C,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match connector.subscribe().await {
            Ok(mut source) => {
                info!(source = source.source_name(), "Subscribed to position source");
                match ingest.run(&mut *source, &cancel).await {
                    Ok(()) => return, // cancelled
                    Err(e) => {
                        warn!(error = %e, "Position source failed — restarting ingest");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not subscribe to position source");
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(SOURCE_RESTART_DELAY) => {}
        }
    }
}
