//! Start-marker options, frame classes and response status codes

use std::fmt;

use super::{SOP2_BASE, SOP2_RESPONSE};

/// Class of an inbound frame, taken from the second start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameKind {
    /// Synchronous answer to a command, correlated by sequence
    Response,
    /// Unsolicited asynchronous notification
    Event,
}

impl FrameKind {
    /// Classify a second start marker
    #[must_use]
    pub const fn from_sop2(sop2: u8) -> Self {
        if sop2 == SOP2_RESPONSE {
            Self::Response
        } else {
            Self::Event
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response => write!(f, "response"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Outbound options carried in the low bits of the second start marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    /// Ask the robot to answer with a synchronous response
    pub request_ack: bool,
    /// Reset the robot's client inactivity timer
    pub reset_inactivity_timer: bool,
}

impl Options {
    /// Acknowledgement bit
    pub const ACK: u8 = 1 << 0;
    /// Inactivity timer reset bit
    pub const RESET_TIMER: u8 = 1 << 1;
    /// Valid option bits
    pub const VALID_MASK: u8 = Self::ACK | Self::RESET_TIMER;

    /// No options set
    #[must_use]
    pub const fn none() -> Self {
        Self {
            request_ack: false,
            reset_inactivity_timer: false,
        }
    }

    /// Both options set
    #[must_use]
    pub const fn all() -> Self {
        Self {
            request_ack: true,
            reset_inactivity_timer: true,
        }
    }

    /// Build the second start marker
    #[must_use]
    pub const fn to_sop2(self) -> u8 {
        let mut sop2 = SOP2_BASE;
        if self.request_ack {
            sop2 |= Self::ACK;
        }
        if self.reset_inactivity_timer {
            sop2 |= Self::RESET_TIMER;
        }
        sop2
    }

    /// Recover options from a second start marker
    #[must_use]
    pub const fn from_sop2(sop2: u8) -> Self {
        Self {
            request_ack: sop2 & Self::ACK != 0,
            reset_inactivity_timer: sop2 & Self::RESET_TIMER != 0,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.request_ack {
            parts.push("ACK");
        }
        if self.reset_inactivity_timer {
            parts.push("RESET_TIMER");
        }
        if parts.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}

/// Status byte of a synchronous response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResponseCode {
    /// Command succeeded
    Ok,
    /// General, non-specific error
    GeneralError,
    /// Received checksum failure
    ChecksumFailure,
    /// Received command fragment
    Fragment,
    /// Unknown command id
    BadCommand,
    /// Command currently unsupported
    Unsupported,
    /// Bad message format
    BadMessage,
    /// Parameter value(s) invalid
    BadParameter,
    /// Failed to execute command
    ExecutionFailure,
    /// Unknown device id
    BadDeviceId,
    /// Generic RAM access needed but it is busy
    MemoryBusy,
    /// Supplied password incorrect
    BadPassword,
    /// Voltage too low for reflash operation
    PowerTooLow,
    /// Illegal page number provided
    IllegalPage,
    /// Page did not reprogram correctly
    FlashFailure,
    /// Main application corrupt
    MainAppCorrupt,
    /// Message state machine timed out
    MessageTimeout,
    /// Any status the table does not name
    Unknown(u8),
}

impl ResponseCode {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::GeneralError,
            0x02 => Self::ChecksumFailure,
            0x03 => Self::Fragment,
            0x04 => Self::BadCommand,
            0x05 => Self::Unsupported,
            0x06 => Self::BadMessage,
            0x07 => Self::BadParameter,
            0x08 => Self::ExecutionFailure,
            0x09 => Self::BadDeviceId,
            0x0A => Self::MemoryBusy,
            0x0B => Self::BadPassword,
            0x31 => Self::PowerTooLow,
            0x32 => Self::IllegalPage,
            0x33 => Self::FlashFailure,
            0x34 => Self::MainAppCorrupt,
            0x35 => Self::MessageTimeout,
            other => Self::Unknown(other),
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::GeneralError => 0x01,
            Self::ChecksumFailure => 0x02,
            Self::Fragment => 0x03,
            Self::BadCommand => 0x04,
            Self::Unsupported => 0x05,
            Self::BadMessage => 0x06,
            Self::BadParameter => 0x07,
            Self::ExecutionFailure => 0x08,
            Self::BadDeviceId => 0x09,
            Self::MemoryBusy => 0x0A,
            Self::BadPassword => 0x0B,
            Self::PowerTooLow => 0x31,
            Self::IllegalPage => 0x32,
            Self::FlashFailure => 0x33,
            Self::MainAppCorrupt => 0x34,
            Self::MessageTimeout => 0x35,
            Self::Unknown(other) => other,
        }
    }

    /// Check if the status signals success
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::GeneralError => "general error",
            Self::ChecksumFailure => "checksum failure",
            Self::Fragment => "command fragment",
            Self::BadCommand => "bad command",
            Self::Unsupported => "unsupported command",
            Self::BadMessage => "bad message",
            Self::BadParameter => "bad parameter",
            Self::ExecutionFailure => "execution failure",
            Self::BadDeviceId => "bad device id",
            Self::MemoryBusy => "memory busy",
            Self::BadPassword => "bad password",
            Self::PowerTooLow => "power too low",
            Self::IllegalPage => "illegal page",
            Self::FlashFailure => "flash failure",
            Self::MainAppCorrupt => "main application corrupt",
            Self::MessageTimeout => "message timeout",
            Self::Unknown(code) => return write!(f, "unknown status ({code:#04x})"),
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_to_sop2() {
        assert_eq!(Options::none().to_sop2(), 0xFC);
        assert_eq!(Options::all().to_sop2(), 0xFF);

        let ack_only = Options {
            request_ack: true,
            reset_inactivity_timer: false,
        };
        assert_eq!(ack_only.to_sop2(), 0xFD);
        assert_eq!(Options::from_sop2(0xFD), ack_only);

        let timer_only = Options {
            request_ack: false,
            reset_inactivity_timer: true,
        };
        assert_eq!(timer_only.to_sop2(), 0xFE);
    }

    #[test]
    fn test_frame_kind_classification() {
        assert_eq!(FrameKind::from_sop2(0xFF), FrameKind::Response);
        assert_eq!(FrameKind::from_sop2(0xFE), FrameKind::Event);
        assert_eq!(FrameKind::from_sop2(0xFC), FrameKind::Event);
    }

    #[test]
    fn test_response_code_roundtrip() {
        for byte in [0x00, 0x01, 0x07, 0x0B, 0x31, 0x35, 0x99] {
            assert_eq!(ResponseCode::from_u8(byte).as_u8(), byte);
        }
        assert!(ResponseCode::from_u8(0).is_ok());
        assert_eq!(ResponseCode::from_u8(0x99), ResponseCode::Unknown(0x99));
        assert_eq!(ResponseCode::BadParameter.to_string(), "bad parameter");
    }
}
