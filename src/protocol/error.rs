//! Protocol error types

use std::sync::Arc;

use thiserror::Error;

use super::{Frame, ResponseCode};

/// Errors raised while building, parsing, correlating or decoding frames.
#[derive(Error, Debug)]
pub enum Error {
    /// Outbound payload does not fit the one-byte length field
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Buffer too small
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Needed size
        needed: usize,
        /// Actual size
        got: usize,
    },

    /// A start marker byte holds an unexpected value
    #[error("invalid start marker at offset {position}: {found:#04x}")]
    InvalidStartMarker {
        /// Offset of the marker within the frame
        position: usize,
        /// Byte found there
        found: u8,
    },

    /// Length byte of zero; it must at least count the checksum
    #[error("invalid length field: {length}")]
    InvalidLength {
        /// Declared length
        length: u8,
    },

    /// Checksum mismatch
    #[error("checksum mismatch: expected {expected:#04x}, got {found:#04x}")]
    ChecksumMismatch {
        /// Checksum recomputed over the frame
        expected: u8,
        /// Checksum carried by the frame
        found: u8,
    },

    /// A response arrived for a sequence nobody is waiting on
    #[error("no pending request for sequence {sequence}")]
    UnmatchedResponse {
        /// Sequence carried by the response
        sequence: u8,
    },

    /// The sequence slot is still held by an unresolved request
    #[error("sequence {sequence} is still in flight")]
    SequenceExhausted {
        /// Sequence that could not be registered
        sequence: u8,
    },

    /// A descriptor points past the end of the payload
    #[error("malformed event {id:#04x}: field `{field}` needs {needed} bytes, payload has {got}")]
    MalformedEvent {
        /// Event id (or command id for responses)
        id: u8,
        /// Field name
        field: &'static str,
        /// Bytes required by the descriptor
        needed: usize,
        /// Bytes present in the payload
        got: usize,
    },

    /// The robot answered with a non-zero status
    #[error("device reported {code} for sequence {}", frame.sequence())]
    Device {
        /// Status code from the response
        code: ResponseCode,
        /// The response frame as received
        frame: Box<Frame>,
    },

    /// No response arrived within the configured window
    #[error("timed out waiting for response to sequence {sequence}")]
    Timeout {
        /// Sequence that was abandoned
        sequence: u8,
    },

    /// The transport closed before the request resolved
    #[error("transport closed")]
    Closed,

    /// The transport failed while reading; every waiter sees the same error
    #[error("transport failed: {0}")]
    Transport(Arc<std::io::Error>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
