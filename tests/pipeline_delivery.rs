//! Delivery Pipeline Tests
//!
//! Exercises the ingest loop, spool, and resend worker together against
//! a mock transport: records delivered in order while connected, durable
//! spool fallback while disconnected, drain once connectivity returns,
//! and tick abandonment on a mid-drain failure.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracklink::ingest::IngestLoop;
use tracklink::resend::drain_spool;
use tracklink::source::{ReplaySource, SourceEvent};
use tracklink::spool::Spool;
use tracklink::types::{ClientInfo, PositionFix};
use tracklink::uplink::{UplinkSlot, UplinkTransport};

/// Transport that records every payload and fails on demand.
///
/// `fail_after` = number of successful sends before every further send
/// errors (usize::MAX = never fail).
struct MockTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    successes: Arc<AtomicUsize>,
    fail_after: usize,
}

#[async_trait]
impl UplinkTransport for MockTransport {
    async fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
        if self.successes.load(Ordering::SeqCst) >= self.fail_after {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "collector unreachable",
            ));
        }
        self.successes.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(payload.to_vec());
        Ok(())
    }
}

fn mock_transport(fail_after: usize) -> (Box<MockTransport>, Arc<Mutex<Vec<Vec<u8>>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let transport = Box::new(MockTransport {
        sent: Arc::clone(&sent),
        successes: Arc::new(AtomicUsize::new(0)),
        fail_after,
    });
    (transport, sent)
}

fn fix(n: u32) -> PositionFix {
    serde_json::from_value(serde_json::json!({
        "mode": 3,
        "lat": 59.0 + f64::from(n) * 0.001,
        "lon": 24.0,
        "time": format!("2024-03-01T12:00:{:02}Z", n),
    }))
    .unwrap()
}

struct Harness {
    _tmp: tempfile::TempDir,
    slot: Arc<UplinkSlot>,
    spool: Arc<Spool>,
    ingest: IngestLoop,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let slot = Arc::new(UplinkSlot::new());
    let spool = Arc::new(Spool::open(tmp.path().join("spool")).unwrap());
    let ingest = IngestLoop::new(
        ClientInfo::new("test-rover"),
        Arc::clone(&slot),
        Arc::clone(&spool),
        tmp.path().join("last.json"),
    );
    Harness {
        _tmp: tmp,
        slot,
        spool,
        ingest,
    }
}

// ============================================================================
// P1 — no loss while connected
// ============================================================================

#[tokio::test]
async fn connected_fixes_are_sent_in_order_and_spool_stays_empty() {
    let h = harness();
    let (transport, sent) = mock_transport(usize::MAX);
    h.slot.install(transport).await;

    for n in 0..5 {
        h.ingest.process_fix(fix(n)).await;
        assert_eq!(h.spool.pending_count().unwrap(), 0);
    }

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 5);
    for (n, payload) in sent.iter().enumerate() {
        let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
        // Arrival order preserved
        let time = value["position"]["time"].as_str().unwrap();
        assert!(time.contains(&format!("12:00:{n:02}")));
        assert_eq!(value["info"]["id"], "test-rover");
    }
}

// ============================================================================
// P2 — durable fallback while disconnected
// ============================================================================

#[tokio::test]
async fn disconnected_fixes_produce_exactly_one_spool_entry_each() {
    let h = harness();

    h.ingest.process_fix(fix(0)).await;
    h.ingest.process_fix(fix(1)).await;
    h.ingest.process_fix(fix(2)).await;

    let pending = h.spool.list_pending().unwrap();
    assert_eq!(pending.len(), 3);
    for (n, entry) in pending.iter().enumerate() {
        let value: serde_json::Value = serde_json::from_slice(&entry.read().unwrap()).unwrap();
        let time = value["position"]["time"].as_str().unwrap();
        assert!(time.contains(&format!("12:00:{n:02}")));
    }
}

#[tokio::test]
async fn send_failure_invalidates_and_spools_the_inflight_record() {
    let h = harness();
    let (transport, sent) = mock_transport(1);
    h.slot.install(transport).await;

    h.ingest.process_fix(fix(0)).await; // delivered live
    h.ingest.process_fix(fix(1)).await; // transport fails -> spooled

    assert_eq!(sent.lock().unwrap().len(), 1);
    assert_eq!(h.spool.pending_count().unwrap(), 1);
    assert!(!h.slot.is_connected());

    // Subsequent fixes go straight to the spool.
    h.ingest.process_fix(fix(2)).await;
    assert_eq!(h.spool.pending_count().unwrap(), 2);
}

// ============================================================================
// P3 — eventual drain (and the fix1/fix2 reconnect scenario)
// ============================================================================

#[tokio::test]
async fn reconnect_then_drain_delivers_spooled_records_in_order() {
    let h = harness();

    // fix1 arrives with no connection -> spool {e1}
    h.ingest.process_fix(fix(1)).await;
    assert_eq!(h.spool.pending_count().unwrap(), 1);

    // fix2 arrives, still no connection -> spool {e1, e2}
    h.ingest.process_fix(fix(2)).await;
    assert_eq!(h.spool.pending_count().unwrap(), 2);

    // Connection becomes available; next tick drains e1 then e2.
    let (transport, sent) = mock_transport(usize::MAX);
    h.slot.install(transport).await;

    let resent = drain_spool(&h.slot, &h.spool).await;
    assert_eq!(resent, 2);
    assert_eq!(h.spool.pending_count().unwrap(), 0);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    let first: serde_json::Value = serde_json::from_slice(&sent[0]).unwrap();
    let second: serde_json::Value = serde_json::from_slice(&sent[1]).unwrap();
    assert!(first["position"]["time"].as_str().unwrap().contains("12:00:01"));
    assert!(second["position"]["time"].as_str().unwrap().contains("12:00:02"));
}

#[tokio::test]
async fn repeated_ticks_drain_a_large_backlog_exactly_once() {
    let h = harness();
    for n in 0..10 {
        h.ingest.process_fix(fix(n)).await;
    }

    let (transport, sent) = mock_transport(usize::MAX);
    h.slot.install(transport).await;

    let mut total = 0;
    while total < 10 {
        let resent = drain_spool(&h.slot, &h.spool).await;
        assert!(resent > 0, "drain made no progress");
        total += resent;
    }

    assert_eq!(h.spool.pending_count().unwrap(), 0);
    assert_eq!(sent.lock().unwrap().len(), 10);
    // Nothing left to send — further ticks are no-ops.
    assert_eq!(drain_spool(&h.slot, &h.spool).await, 0);
}

// ============================================================================
// P4 — tick abort on failure
// ============================================================================

#[tokio::test]
async fn drain_stops_at_first_failure_leaving_the_rest_untouched() {
    let h = harness();
    for n in 0..4 {
        h.ingest.process_fix(fix(n)).await;
    }

    // Two sends succeed, then the transport dies mid-tick.
    let (transport, sent) = mock_transport(2);
    h.slot.install(transport).await;

    let resent = drain_spool(&h.slot, &h.spool).await;
    assert_eq!(resent, 2);
    assert_eq!(sent.lock().unwrap().len(), 2);
    assert!(!h.slot.is_connected());

    // The unattempted entries remain, still in order, for the next tick.
    let pending = h.spool.list_pending().unwrap();
    assert_eq!(pending.len(), 2);
    let value: serde_json::Value = serde_json::from_slice(&pending[0].read().unwrap()).unwrap();
    assert!(value["position"]["time"].as_str().unwrap().contains("12:00:02"));

    // Supervisor reconnects; the next tick finishes the job.
    let (transport, sent2) = mock_transport(usize::MAX);
    h.slot.install(transport).await;
    assert_eq!(drain_spool(&h.slot, &h.spool).await, 2);
    assert_eq!(h.spool.pending_count().unwrap(), 0);
    assert_eq!(sent2.lock().unwrap().len(), 2);
}

// ============================================================================
// Snapshot behavior through the ingest loop
// ============================================================================

#[tokio::test]
async fn snapshot_always_holds_the_latest_fix_only() {
    let tmp = tempfile::tempdir().unwrap();
    let slot = Arc::new(UplinkSlot::new());
    let spool = Arc::new(Spool::open(tmp.path().join("spool")).unwrap());
    let snapshot_path = tmp.path().join("positions/last.json");
    let ingest = IngestLoop::new(
        ClientInfo::new("test-rover"),
        Arc::clone(&slot),
        Arc::clone(&spool),
        snapshot_path.clone(),
    );

    for n in 0..3 {
        ingest.process_fix(fix(n)).await;
    }

    let content = std::fs::read(&snapshot_path).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&content).unwrap();
    assert!(value["position"]["time"].as_str().unwrap().contains("12:00:02"));
    // One record, not a concatenation.
    assert_eq!(content.iter().filter(|&&b| b == b'\n').count(), 1);
}

// ============================================================================
// Ingest loop event filtering
// ============================================================================

#[tokio::test]
async fn ingest_run_skips_non_positional_events() {
    let h = harness();
    let (transport, sent) = mock_transport(usize::MAX);
    h.slot.install(transport).await;

    let mut source = ReplaySource::new(vec![
        SourceEvent::Skipped,
        SourceEvent::Fix(fix(0)),
        SourceEvent::Skipped,
        SourceEvent::Fix(fix(1)),
    ]);
    let cancel = tokio_util::sync::CancellationToken::new();

    // Eof after the events -> the run reports a source failure for the
    // outer restart boundary.
    let result = h.ingest.run(&mut source, &cancel).await;
    assert!(result.is_err());

    assert_eq!(sent.lock().unwrap().len(), 2);
    assert_eq!(h.spool.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn ingest_run_stops_cleanly_on_cancellation() {
    let h = harness();
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    let mut source = ReplaySource::from_fixes(vec![fix(0)]);
    let result = h.ingest.run(&mut source, &cancel).await;
    assert!(result.is_ok());
}
