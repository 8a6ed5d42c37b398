//! Decoded frame

use bytes::Bytes;

use super::{FrameHeader, FrameKind, Options, ResponseCode, Result};

/// One complete protocol message: header, payload and a validated checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    /// Assemble a frame from a parsed header and its payload
    #[must_use]
    pub(crate) fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Frame class (response or event)
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        self.header.kind()
    }

    /// Check if this is a synchronous response
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self.kind(), FrameKind::Response)
    }

    /// Device id byte
    #[must_use]
    pub const fn device_id(&self) -> u8 {
        self.header.device_id()
    }

    /// Command id byte, as written by the sender of a command frame
    #[must_use]
    pub const fn command_id(&self) -> u8 {
        self.header.code()
    }

    /// Response status
    #[must_use]
    pub const fn status(&self) -> ResponseCode {
        ResponseCode::from_u8(self.header.code())
    }

    /// Async id code of an event frame
    #[must_use]
    pub const fn event_id(&self) -> u8 {
        self.header.device_id()
    }

    /// Sequence number
    #[must_use]
    pub const fn sequence(&self) -> u8 {
        self.header.sequence()
    }

    /// Options carried by the second start marker
    #[must_use]
    pub const fn options(&self) -> Options {
        self.header.options()
    }

    /// Get payload
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Get header
    #[must_use]
    pub const fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Encode frame to bytes, recomputing the checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        super::encode_with_marker(
            self.header.sop2(),
            self.header.device_id(),
            self.header.code(),
            self.header.sequence(),
            &self.payload,
        )
    }

    /// Decode frame from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        super::decode(Bytes::copy_from_slice(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let bytes = crate::protocol::encode(0x02, 0x22, 9, b"abc", Options::all()).unwrap();
        let frame = Frame::decode(&bytes).unwrap();

        assert_eq!(frame.device_id(), 0x02);
        assert_eq!(frame.command_id(), 0x22);
        assert_eq!(frame.sequence(), 9);
        assert_eq!(frame.payload().as_ref(), b"abc");
        assert_eq!(frame.encode().unwrap(), bytes);
    }
}
