//! Sequence allocation and response correlation.
//!
//! The dispatcher owns the one-byte sequence counter and the table of
//! pending requests keyed by sequence. Both change together on every request,
//! so callers sharing a dispatcher guard the whole struct with one lock.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::protocol::metrics::{Failure, Metrics};
use crate::protocol::{Error, Frame, Result};

/// Handler invoked exactly once with the outcome of a request
pub type Continuation = Box<dyn FnOnce(Result<Frame>) + Send>;

/// Sequence counter plus pending-request table
#[derive(Default)]
pub struct Dispatcher {
    sequence: u8,
    pending: HashMap<u8, Continuation>,
}

impl Dispatcher {
    /// Create with the counter at zero and nothing pending
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current sequence and advance the counter, wrapping at 256
    pub fn next_sequence(&mut self) -> u8 {
        let sequence = self.sequence;
        self.sequence = sequence.wrapping_add(1);
        sequence
    }

    /// Sequence the next request will get, without advancing
    #[must_use]
    pub const fn current_sequence(&self) -> u8 {
        self.sequence
    }

    /// Register the continuation for `sequence`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SequenceExhausted`] if `sequence` still has an
    /// unresolved request; the existing entry is left in place.
    pub fn register<F>(&mut self, sequence: u8, continuation: F) -> Result<()>
    where
        F: FnOnce(Result<Frame>) + Send + 'static,
    {
        if self.pending.contains_key(&sequence) {
            warn!(sequence, in_flight = self.pending.len(), "sequence slot still pending");
            return Err(Error::SequenceExhausted { sequence });
        }

        self.pending.insert(sequence, Box::new(continuation));
        Metrics::record_request_open();
        debug!(sequence, "registered pending request");
        Ok(())
    }

    /// Hand a response frame to the continuation waiting on its sequence
    ///
    /// A non-zero status resolves the continuation with [`Error::Device`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnmatchedResponse`] if nothing is waiting on the
    /// frame's sequence. The frame is dropped.
    pub fn resolve(&mut self, frame: Frame) -> Result<()> {
        let sequence = frame.sequence();
        let Some(continuation) = self.pending.remove(&sequence) else {
            Metrics::record_failure(Failure::Unmatched);
            warn!(sequence, "response matches no pending request");
            return Err(Error::UnmatchedResponse { sequence });
        };
        Metrics::record_request_close();

        let status = frame.status();
        if status.is_ok() {
            debug!(sequence, "resolved pending request");
            continuation(Ok(frame));
        } else {
            debug!(sequence, %status, "device reported failure");
            continuation(Err(Error::Device {
                code: status,
                frame: Box::new(frame),
            }));
        }
        Ok(())
    }

    /// Drop the continuation for `sequence` without invoking it
    ///
    /// Frees the slot for reuse. Returns `false` if nothing was pending.
    pub fn abandon(&mut self, sequence: u8) -> bool {
        if self.pending.remove(&sequence).is_none() {
            return false;
        }
        Metrics::record_request_close();
        Metrics::record_abandoned();
        debug!(sequence, "abandoned pending request");
        true
    }

    /// Fail every pending continuation with an error built by `error`
    pub fn fail_all(&mut self, error: impl Fn() -> Error) {
        let count = self.pending.len();
        for (_, continuation) in self.pending.drain() {
            Metrics::record_request_close();
            continuation(Err(error()));
        }
        if count > 0 {
            debug!(count, "failed pending requests");
        }
    }

    /// Check if `sequence` has an unresolved request
    #[must_use]
    pub fn is_pending(&self, sequence: u8) -> bool {
        self.pending.contains_key(&sequence)
    }

    /// Number of unresolved requests
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending: Vec<_> = self.pending.keys().copied().collect();
        pending.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("sequence", &self.sequence)
            .field("pending", &pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::protocol::{ResponseCode, SOP2_RESPONSE, encode_with_marker};

    fn response(status: u8, sequence: u8, payload: &[u8]) -> Frame {
        let bytes = encode_with_marker(SOP2_RESPONSE, 0x00, status, sequence, payload).unwrap();
        Frame::decode(&bytes).unwrap()
    }

    type Outcomes = Arc<Mutex<Vec<Result<Frame>>>>;

    fn collector(outcomes: &Outcomes) -> impl FnOnce(Result<Frame>) + Send + 'static {
        let outcomes = Arc::clone(outcomes);
        move |result| outcomes.lock().unwrap().push(result)
    }

    #[test]
    fn test_sequence_wraps() {
        let mut dispatcher = Dispatcher::new();
        for expected in 0..=255u8 {
            assert_eq!(dispatcher.next_sequence(), expected);
        }
        assert_eq!(dispatcher.current_sequence(), 0);
        assert_eq!(dispatcher.next_sequence(), 0);
    }

    #[test]
    fn test_resolve_ok() {
        let mut dispatcher = Dispatcher::new();
        let outcomes = Outcomes::default();

        let sequence = dispatcher.next_sequence();
        dispatcher.register(sequence, collector(&outcomes)).unwrap();
        assert!(dispatcher.is_pending(sequence));

        dispatcher.resolve(response(0x00, sequence, &[0xAB])).unwrap();
        assert_eq!(dispatcher.in_flight(), 0);

        let outcomes = outcomes.lock().unwrap();
        let frame = outcomes[0].as_ref().unwrap();
        assert_eq!(frame.payload().as_ref(), &[0xAB]);
    }

    #[test]
    fn test_resolve_device_error() {
        let mut dispatcher = Dispatcher::new();
        let outcomes = Outcomes::default();
        dispatcher.register(4, collector(&outcomes)).unwrap();

        dispatcher.resolve(response(0x07, 4, &[])).unwrap();

        let outcomes = outcomes.lock().unwrap();
        match &outcomes[0] {
            Err(Error::Device { code, frame }) => {
                assert_eq!(*code, ResponseCode::BadParameter);
                assert_eq!(frame.sequence(), 4);
            }
            other => panic!("expected device error, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_response() {
        let mut dispatcher = Dispatcher::new();
        let result = dispatcher.resolve(response(0x00, 9, &[]));
        assert!(matches!(result, Err(Error::UnmatchedResponse { sequence: 9 })));

        // Resolving twice is unmatched the second time.
        let outcomes = Outcomes::default();
        dispatcher.register(1, collector(&outcomes)).unwrap();
        dispatcher.resolve(response(0x00, 1, &[])).unwrap();
        assert!(dispatcher.resolve(response(0x00, 1, &[])).is_err());
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_register_occupied_slot() {
        let mut dispatcher = Dispatcher::new();
        let outcomes = Outcomes::default();
        dispatcher.register(7, collector(&outcomes)).unwrap();

        let result = dispatcher.register(7, collector(&outcomes));
        assert!(matches!(result, Err(Error::SequenceExhausted { sequence: 7 })));
        assert_eq!(dispatcher.in_flight(), 1);
    }

    #[test]
    fn test_full_table_after_wrap() {
        let mut dispatcher = Dispatcher::new();
        let outcomes = Outcomes::default();
        for _ in 0..256 {
            let sequence = dispatcher.next_sequence();
            dispatcher.register(sequence, collector(&outcomes)).unwrap();
        }
        assert_eq!(dispatcher.in_flight(), 256);

        let sequence = dispatcher.next_sequence();
        assert!(dispatcher.register(sequence, collector(&outcomes)).is_err());

        assert!(dispatcher.abandon(sequence));
        dispatcher.register(sequence, collector(&outcomes)).unwrap();
    }

    #[test]
    fn test_abandon_and_fail_all() {
        let mut dispatcher = Dispatcher::new();
        let outcomes = Outcomes::default();
        dispatcher.register(1, collector(&outcomes)).unwrap();
        dispatcher.register(2, collector(&outcomes)).unwrap();

        assert!(dispatcher.abandon(1));
        assert!(!dispatcher.abandon(1));
        assert!(dispatcher.resolve(response(0x00, 1, &[])).is_err());

        dispatcher.fail_all(|| Error::Closed);
        assert_eq!(dispatcher.in_flight(), 0);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(Error::Closed)));
    }
}
