//! The shared connection slot.
//!
//! A single synchronized cell holding either the currently established
//! transport or nothing. The supervisor installs fresh transports; the
//! ingest loop and resend worker only ever send through the slot or
//! invalidate it after a failure.
//!
//! Sends go through [`UplinkSlot::send`], which holds the cell's mutex
//! for the duration of the write — the ingest loop and the resend worker
//! can therefore never be mid-send on the same transport concurrently,
//! and a send failure atomically clears the slot before either of them
//! observes it again.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Upper bound on one transport write. A peer that stops reading would
/// otherwise hold the slot mutex forever and stall ingest, resend, and
/// reconnection all at once; elapsing is treated as a transport failure.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// A live outbound connection the pipeline can send records through.
///
/// Implemented by the TLS transport in production and by mock
/// transports in tests.
#[async_trait]
pub trait UplinkTransport: Send + 'static {
    /// Send one wire-form record. Fire-and-forget: success means the
    /// local write completed without a transport error, nothing more.
    async fn send(&mut self, payload: &[u8]) -> std::io::Result<()>;
}

/// Send failures. Both variants are transient — the caller falls back
/// to the spool (ingest) or abandons the current tick (resend worker).
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no connection is currently established")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(std::io::Error),
}

/// The single outbound connection slot.
pub struct UplinkSlot {
    transport: Mutex<Option<Box<dyn UplinkTransport>>>,
    /// Lock-free view of the slot for the non-blocking `is_connected`
    /// check; only updated while the mutex is held.
    connected: AtomicBool,
}

impl UplinkSlot {
    pub fn new() -> Self {
        Self {
            transport: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether a transport is currently installed. Non-blocking; the
    /// answer may be stale by the time a send is attempted, which is
    /// fine — the send itself re-checks under the lock.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Install a freshly established transport, replacing any previous
    /// one. Called only by the connection supervisor.
    pub async fn install(&self, transport: Box<dyn UplinkTransport>) {
        let mut guard = self.transport.lock().await;
        *guard = Some(transport);
        self.connected.store(true, Ordering::Release);
    }

    /// Clear the slot so the supervisor's next check attempts a
    /// reconnect.
    pub async fn invalidate(&self) {
        let mut guard = self.transport.lock().await;
        *guard = None;
        self.connected.store(false, Ordering::Release);
    }

    /// Send one record through the current transport.
    ///
    /// On a transport error or a write exceeding [`SEND_TIMEOUT`] the
    /// slot is invalidated before returning, so the failure is observed
    /// exactly once.
    pub async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(SendError::NotConnected)?;

        let result = match tokio::time::timeout(SEND_TIMEOUT, transport.send(payload)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "send exceeded the write timeout",
            )),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                *guard = None;
                self.connected.store(false, Ordering::Release);
                Err(SendError::Transport(e))
            }
        }
    }
}

impl Default for UplinkSlot {
    fn default() -> Self {
        Self::new()
    }
}
