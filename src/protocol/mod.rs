//! Wire layer: frame layout, checksum, codec and argument packing.

mod codec;
mod error;
mod header;
mod frame;
pub(crate) mod metrics;
pub mod pack;
mod types;

pub use codec::{FrameDecoder, checksum, decode, encode, encode_with_marker};
pub use error::{Error, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use metrics::{MetricsSnapshot, metrics_snapshot};
pub use types::{FrameKind, Options, ResponseCode};

/// First start marker, constant on every frame.
pub const SOP1: u8 = 0xFF;

/// Base value of the second start marker. The two low bits carry options.
pub const SOP2_BASE: u8 = 0xFC;

/// Second start marker of an inbound synchronous response.
pub const SOP2_RESPONSE: u8 = 0xFF;

/// Second start marker of an inbound asynchronous event.
pub const SOP2_EVENT: u8 = 0xFE;

/// Header size in bytes (markers, ids, sequence, length).
pub const HEADER_SIZE: usize = 6;

/// Checksum size in bytes
pub const CHECKSUM_SIZE: usize = 1;

/// Minimum frame size (header + checksum)
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize - CHECKSUM_SIZE;
