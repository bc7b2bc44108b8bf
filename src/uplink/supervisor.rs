//! Connection supervisor — the fixed-interval reconnect loop.
//!
//! Owns the single outbound connection slot: whenever the slot is
//! empty, one connection attempt is made per interval. The interval is
//! constant (no exponential backoff) and there is no retry bound — a
//! failed attempt is logged and silently retried forever. The loop
//! never blocks the ingest or resend paths; they only read the slot.

use crate::uplink::slot::UplinkSlot;
use crate::uplink::tls::UplinkConnect;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Grace period after startup before the first connection attempt.
pub const STARTUP_GRACE: Duration = Duration::from_secs(10);

/// Fixed delay between reconnect checks.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Run the reconnect loop until cancelled.
///
/// Spawn this once per process; the production entry point never
/// cancels it, the token exists so tests and graceful shutdown can
/// terminate it deterministically.
pub async fn run_supervisor<C: UplinkConnect>(
    slot: Arc<UplinkSlot>,
    connector: Arc<C>,
    cancel: CancellationToken,
) {
    info!(
        grace_secs = STARTUP_GRACE.as_secs(),
        interval_secs = RECONNECT_INTERVAL.as_secs(),
        "Connection supervisor started"
    );

    tokio::select! {
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(STARTUP_GRACE) => {}
    }

    loop {
        if cancel.is_cancelled() {
            return;
        }

        if !slot.is_connected() {
            debug!("Slot empty — attempting to connect");
            match connector.connect().await {
                Ok(transport) => {
                    slot.install(transport).await;
                    info!("Uplink established");
                }
                Err(e) => {
                    warn!(error = %e, "Connection attempt failed — retrying at fixed interval");
                }
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(RECONNECT_INTERVAL) => {}
        }
    }
}
