//! Frame codec (encode/decode) and stream reassembly

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use super::{
    Error, Frame, FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE, Options, Result,
    SOP1, SOP2_BASE,
};

/// Checksum over a byte range: the modulo-256 sum, bitwise complemented.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) ^ 0xFF
}

/// Encode an outbound command frame
///
/// # Format
///
/// ```text
/// [FF] [SOP2] [DID] [CID] [SEQ] [LEN] [PAYLOAD (LEN - 1)] [CHK]
/// ```
///
/// The checksum covers `DID` through the last payload byte.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] when the payload exceeds 254 bytes.
pub fn encode(
    device_id: u8,
    command_id: u8,
    sequence: u8,
    payload: &[u8],
    options: Options,
) -> Result<Vec<u8>> {
    encode_with_marker(options.to_sop2(), device_id, command_id, sequence, payload)
}

/// Encode a frame with an explicit second start marker
///
/// Used to build inbound-shaped frames (`0xFF` responses, `0xFE` events),
/// e.g. when simulating the robot side of a link.
pub fn encode_with_marker(
    sop2: u8,
    device_id: u8,
    code: u8,
    sequence: u8,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    // Fits: payload.len() + 1 <= 255
    let length = (payload.len() + 1) as u8;
    let header = FrameHeader::with_sop2(sop2, device_id, code, sequence, length);

    let mut bytes = Vec::with_capacity(MIN_FRAME_SIZE + payload.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(payload);

    let sum = checksum(&bytes[2..]);
    bytes.push(sum);

    Ok(bytes)
}

/// Decode a frame from bytes
///
/// Bytes past the declared frame end are ignored.
///
/// # Errors
///
/// Returns an error if:
/// - Buffer is shorter than 7 bytes or than the declared length
/// - A start marker is invalid
/// - Checksum doesn't match
pub fn decode(bytes: Bytes) -> Result<Frame> {
    let total_available = bytes.len();

    // Check minimum size
    if total_available < MIN_FRAME_SIZE {
        return Err(Error::BufferTooSmall {
            needed: MIN_FRAME_SIZE,
            got: total_available,
        });
    }

    let header = FrameHeader::from_bytes(&bytes[..HEADER_SIZE])?;

    let checksum_offset = header.checksum_offset();
    if total_available <= checksum_offset {
        return Err(Error::BufferTooSmall {
            needed: checksum_offset + 1,
            got: total_available,
        });
    }

    let found = bytes[checksum_offset];
    let expected = checksum(&bytes[2..checksum_offset]);
    if found != expected {
        return Err(Error::ChecksumMismatch { expected, found });
    }

    let payload = bytes.slice(HEADER_SIZE..checksum_offset);
    Ok(Frame::from_parts(header, payload))
}

/// Reassembles frames from a byte stream that may arrive chunked or coalesced.
///
/// Bytes ahead of a plausible start-marker pair are dropped. A candidate
/// frame that fails its checksum is reported, then only its first byte is
/// dropped, so a real frame hiding behind a stray `0xFF` is still found.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a new decoder
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HEADER_SIZE + u8::MAX as usize)
    }

    /// Create a decoder with a preallocated buffer
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Add received data to the buffer
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take the next complete frame off the buffer
    ///
    /// Returns `None` when more data is needed.
    pub fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            self.skip_to_marker();

            if self.buffer.len() < HEADER_SIZE {
                return None;
            }

            let header = match FrameHeader::from_bytes(&self.buffer[..HEADER_SIZE]) {
                Ok(header) => header,
                Err(err) => {
                    trace!(error = %err, "dropping byte before unusable header");
                    self.buffer.advance(1);
                    continue;
                }
            };

            let total = header.checksum_offset() + 1;
            if self.buffer.len() < total {
                return None;
            }

            let found = self.buffer[total - 1];
            let expected = checksum(&self.buffer[2..total - 1]);
            if found != expected {
                // The marker pair may have been noise; rescan from the next byte.
                trace!(expected, found, "checksum failed, resyncing");
                self.buffer.advance(1);
                return Some(Err(Error::ChecksumMismatch { expected, found }));
            }

            let frame = self.buffer.split_to(total).freeze();
            return Some(decode(frame));
        }
    }

    /// Get the number of buffered bytes
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn skip_to_marker(&mut self) {
        let mut skipped = 0usize;
        while let Some(&first) = self.buffer.first() {
            if first == SOP1 {
                match self.buffer.get(1) {
                    None => break,
                    Some(&sop2) if sop2 & SOP2_BASE == SOP2_BASE => break,
                    Some(_) => {}
                }
            }
            self.buffer.advance(1);
            skipped += 1;
        }
        if skipped > 0 {
            trace!(skipped, "discarded bytes ahead of start marker");
        }
    }
}
