use std::sync::atomic::{AtomicU64, Ordering};

use super::FrameKind;

/// Track protocol counters without external dependencies.
pub(crate) struct Metrics;

static FRAMES_SENT: AtomicU64 = AtomicU64::new(0);
static FRAMES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static RESPONSES: AtomicU64 = AtomicU64::new(0);
static EVENTS: AtomicU64 = AtomicU64::new(0);
static CHECKSUM_FAILURES: AtomicU64 = AtomicU64::new(0);
static UNMATCHED_RESPONSES: AtomicU64 = AtomicU64::new(0);
static MALFORMED_EVENTS: AtomicU64 = AtomicU64::new(0);
static UNKNOWN_EVENTS: AtomicU64 = AtomicU64::new(0);
static ABANDONED_REQUESTS: AtomicU64 = AtomicU64::new(0);
static IN_FLIGHT: AtomicU64 = AtomicU64::new(0);

/// Failure classes counted on the receive path.
#[derive(Clone, Copy)]
pub(crate) enum Failure {
    Checksum,
    Unmatched,
    Malformed,
}

impl Metrics {
    #[inline]
    pub(crate) fn record_sent() {
        FRAMES_SENT.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_received(kind: FrameKind) {
        FRAMES_RECEIVED.fetch_add(1, Ordering::Relaxed);
        match kind {
            FrameKind::Response => RESPONSES.fetch_add(1, Ordering::Relaxed),
            FrameKind::Event => EVENTS.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub(crate) fn record_failure(failure: Failure) {
        let counter = match failure {
            Failure::Checksum => &CHECKSUM_FAILURES,
            Failure::Unmatched => &UNMATCHED_RESPONSES,
            Failure::Malformed => &MALFORMED_EVENTS,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_unknown_event() {
        UNKNOWN_EVENTS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_request_open() {
        IN_FLIGHT.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_request_close() {
        let _ = IN_FLIGHT.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    #[inline]
    pub(crate) fn record_abandoned() {
        ABANDONED_REQUESTS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn totals() -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: FRAMES_SENT.load(Ordering::Relaxed),
            frames_received: FRAMES_RECEIVED.load(Ordering::Relaxed),
            responses: RESPONSES.load(Ordering::Relaxed),
            events: EVENTS.load(Ordering::Relaxed),
            checksum_failures: CHECKSUM_FAILURES.load(Ordering::Relaxed),
            unmatched_responses: UNMATCHED_RESPONSES.load(Ordering::Relaxed),
            malformed_events: MALFORMED_EVENTS.load(Ordering::Relaxed),
            unknown_events: UNKNOWN_EVENTS.load(Ordering::Relaxed),
            abandoned_requests: ABANDONED_REQUESTS.load(Ordering::Relaxed),
            in_flight: IN_FLIGHT.load(Ordering::Relaxed),
        }
    }
}

/// Process-wide snapshot of protocol counters.
#[derive(Default, Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Frames written to a transport
    pub frames_sent: u64,
    /// Frames that passed checksum validation
    pub frames_received: u64,
    /// Inbound synchronous responses
    pub responses: u64,
    /// Inbound async events
    pub events: u64,
    /// Frames discarded for a bad checksum
    pub checksum_failures: u64,
    /// Responses nobody was waiting on
    pub unmatched_responses: u64,
    /// Events or responses whose payload did not fit the descriptor
    pub malformed_events: u64,
    /// Events with an id the table does not know
    pub unknown_events: u64,
    /// Requests dropped by a timeout or by the caller
    pub abandoned_requests: u64,
    /// Requests waiting on a response
    pub in_flight: u64,
}

impl MetricsSnapshot {
    /// Receive-path failures of any class.
    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.checksum_failures + self.unmatched_responses + self.malformed_events
    }
}

/// Read the current counters.
#[must_use]
pub fn metrics_snapshot() -> MetricsSnapshot {
    Metrics::totals()
}
