//! Command catalog and the typed command traits built on it.
//!
//! Opcodes live in two disjoint tables, one per virtual device. The typed
//! traits pack arguments with [`crate::protocol::pack`] and hand the frame
//! to a [`Commander`], so any transport that can issue a raw command gets the
//! whole catalog for free.

/// Declares one documented opcode constant per entry and the `ALL` table.
macro_rules! opcode_table {
    ($device:expr; $($name:ident = $command:literal, $label:literal;)+) => {
        $(
            #[doc = concat!("`", $label, "` (command ", stringify!($command), ")")]
            pub const $name: $crate::commands::Opcode =
                $crate::commands::Opcode::new($device, $command, $label);
        )+

        /// Every opcode of this device, in command id order
        pub static ALL: &[$crate::commands::Opcode] = &[$($name),+];
    };
}

pub mod core_ops;
mod helpers;
pub mod robot_ops;

use std::fmt;
use std::future::Future;

use bytes::Bytes;

pub use core_ops::CoreCommands;
pub use helpers::Helpers;
pub use robot_ops::{CollisionConfig, RobotCommands, StreamingConfig};

use crate::events::{Fields, StreamingMask};
use crate::protocol::{Frame, ResponseCode, Result};

/// A (device, command) pair with its symbolic name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Opcode {
    /// Virtual device id
    pub device: u8,
    /// Command id within the device
    pub command: u8,
    /// Symbolic name
    pub name: &'static str,
}

impl Opcode {
    pub(crate) const fn new(device: u8, command: u8, name: &'static str) -> Self {
        Self {
            device,
            command,
            name,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x}:{:#04x})", self.name, self.device, self.command)
    }
}

/// Every opcode in both tables
pub fn all() -> impl Iterator<Item = &'static Opcode> {
    core_ops::ALL.iter().chain(robot_ops::ALL)
}

/// Find an opcode by symbolic name
#[must_use]
pub fn by_name(name: &str) -> Option<Opcode> {
    all().find(|op| op.name == name).copied()
}

/// Find an opcode by its wire pair
#[must_use]
pub fn lookup(device: u8, command: u8) -> Option<Opcode> {
    all()
        .find(|op| op.device == device && op.command == command)
        .copied()
}

/// Outcome of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Command that was sent
    pub opcode: Opcode,
    /// Sequence number the command went out with
    pub sequence: u8,
    /// Response frame; `None` when no acknowledgement was requested
    pub frame: Option<Frame>,
    /// Fields decoded from the response payload
    pub fields: Fields,
}

impl Response {
    /// Status reported by the device, `Ok` for unacknowledged commands
    #[must_use]
    pub fn status(&self) -> ResponseCode {
        self.frame.as_ref().map_or(ResponseCode::Ok, Frame::status)
    }

    /// Raw response payload
    #[must_use]
    pub fn payload(&self) -> Bytes {
        self.frame
            .as_ref()
            .map(|frame| frame.payload().clone())
            .unwrap_or_default()
    }
}

/// Anything that can put a raw command on the wire and await its response.
///
/// The typed traits ([`CoreCommands`], [`RobotCommands`], [`Helpers`]) are
/// implemented for every `Commander`.
pub trait Commander: Sync {
    /// Send `payload` under `opcode` and resolve with the response
    fn command(
        &self,
        opcode: Opcode,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<Response>> + Send;

    /// Sensor selection used to decode streaming frames
    fn streaming_mask(&self) -> StreamingMask;

    /// Replace the sensor selection used to decode streaming frames
    fn set_streaming_mask(&self, mask: StreamingMask);
}
