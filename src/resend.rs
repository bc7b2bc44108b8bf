//! Resend worker — drains the spool once connectivity returns.
//!
//! On a fixed period, if a connection is currently present, pending
//! spool entries are sent in creation order; each successfully sent
//! entry is removed. The first send failure abandons the rest of the
//! tick — by the next tick the supervisor may have reconnected.

use crate::spool::Spool;
use crate::uplink::UplinkSlot;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay before the first drain attempt after startup.
pub const RESEND_INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Fixed period between drain ticks.
pub const RESEND_INTERVAL: Duration = Duration::from_secs(5);

/// One drain pass over the spool. Returns the number of entries
/// successfully resent and removed.
///
/// Entries that cannot be read are logged and left for a later tick; a
/// send failure stops the pass immediately (the slot invalidates
/// itself), leaving the unattempted entries untouched.
pub async fn drain_spool(slot: &UplinkSlot, spool: &Spool) -> usize {
    let pending = match spool.list_pending() {
        Ok(pending) if pending.is_empty() => return 0,
        Ok(pending) => pending,
        Err(e) => {
            warn!(error = %e, "Failed to list spool entries");
            return 0;
        }
    };

    debug!(pending = pending.len(), "Draining spool");
    let mut resent = 0;

    for entry in &pending {
        let payload = match entry.read() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    entry = %entry.path().display(),
                    error = %e,
                    "Could not read spool entry — leaving for retry"
                );
                continue;
            }
        };

        match slot.send(&payload).await {
            Ok(()) => {
                if let Err(e) = spool.remove(entry) {
                    // The entry will be sent again next tick; the
                    // collector tolerates duplicates.
                    warn!(error = %e, "Failed to remove resent spool entry");
                }
                resent += 1;
            }
            Err(e) => {
                warn!(error = %e, "Resend failed — abandoning this tick");
                break;
            }
        }
    }

    if resent > 0 {
        info!(resent, "Spooled records delivered");
    }
    resent
}

/// Run the periodic resend loop until cancelled.
pub async fn run_resend(slot: Arc<UplinkSlot>, spool: Arc<Spool>, cancel: CancellationToken) {
    info!(
        initial_delay_secs = RESEND_INITIAL_DELAY.as_secs(),
        interval_secs = RESEND_INTERVAL.as_secs(),
        "Resend worker started"
    );

    tokio::select! {
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(RESEND_INITIAL_DELAY) => {}
    }

    loop {
        if slot.is_connected() {
            drain_spool(&slot, &spool).await;
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(RESEND_INTERVAL) => {}
        }
    }
}
