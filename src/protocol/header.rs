//! Frame header
//!
//! Six bytes precede every payload, outbound and inbound.

use super::{Error, FrameKind, HEADER_SIZE, Options, Result, SOP1, SOP2_BASE};

/// Frame header (6 bytes)
///
/// # Wire Format
///
/// ```text
/// +------+------+-----------+---------------+----------+--------+
/// | SOP1 | SOP2 | device id | command/status| sequence | length |
/// +------+------+-----------+---------------+----------+--------+
///    0      1        2             3             4         5
/// ```
///
/// `length` counts the payload plus the trailing checksum byte. On inbound
/// event frames byte 2 carries the async id code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    sop2: u8,
    device_id: u8,
    code: u8,
    sequence: u8,
    length: u8,
}

impl FrameHeader {
    /// Create an outbound command header
    #[must_use]
    pub const fn command(
        device_id: u8,
        command_id: u8,
        sequence: u8,
        length: u8,
        options: Options,
    ) -> Self {
        Self {
            sop2: options.to_sop2(),
            device_id,
            code: command_id,
            sequence,
            length,
        }
    }

    /// Create a header with an explicit second start marker
    #[must_use]
    pub const fn with_sop2(sop2: u8, device_id: u8, code: u8, sequence: u8, length: u8) -> Self {
        Self {
            sop2,
            device_id,
            code,
            sequence,
            length,
        }
    }

    /// Get second start marker
    #[must_use]
    pub const fn sop2(&self) -> u8 {
        self.sop2
    }

    /// Get frame class
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        FrameKind::from_sop2(self.sop2)
    }

    /// Get outbound options encoded in the second start marker
    #[must_use]
    pub const fn options(&self) -> Options {
        Options::from_sop2(self.sop2)
    }

    /// Get device id (async id code on event frames)
    #[must_use]
    pub const fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Get command id (outbound) or status byte (inbound response)
    #[must_use]
    pub const fn code(&self) -> u8 {
        self.code
    }

    /// Get sequence number
    #[must_use]
    pub const fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Get raw length field (payload + checksum)
    #[must_use]
    pub const fn length(&self) -> u8 {
        self.length
    }

    /// Get payload length in bytes
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.length.saturating_sub(1) as usize
    }

    /// Offset of the checksum byte within the frame
    #[must_use]
    pub const fn checksum_offset(&self) -> usize {
        HEADER_SIZE + self.length as usize - 1
    }

    /// Convert to bytes
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        [
            SOP1,
            self.sop2,
            self.device_id,
            self.code,
            self.sequence,
            self.length,
        ]
    }

    /// Parse from bytes, validating the start markers and length field
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                needed: HEADER_SIZE,
                got: bytes.len(),
            });
        }

        if bytes[0] != SOP1 {
            return Err(Error::InvalidStartMarker {
                position: 0,
                found: bytes[0],
            });
        }

        if bytes[1] & SOP2_BASE != SOP2_BASE {
            return Err(Error::InvalidStartMarker {
                position: 1,
                found: bytes[1],
            });
        }

        if bytes[5] == 0 {
            return Err(Error::InvalidLength { length: 0 });
        }

        Ok(Self {
            sop2: bytes[1],
            device_id: bytes[2],
            code: bytes[3],
            sequence: bytes[4],
            length: bytes[5],
        })
    }
}
