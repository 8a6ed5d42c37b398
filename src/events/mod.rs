//! Table-driven decoding of async events and response payloads

pub mod descriptor;
pub mod streaming;

use std::fmt;

use bytes::Bytes;
use tracing::trace;

pub use descriptor::{
    DescriptorCatalog, EventDescriptor, FieldDescriptor, FieldKind, catalog, ids, read_signed,
    read_unsigned,
};
pub use streaming::{MaskWord, SENSORS, Sample, Sensor, SensorData, SensorReading, StreamingMask};

use crate::protocol::{Frame, Result};

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FieldValue {
    /// Unsigned integer
    Unsigned(u32),
    /// Signed integer
    Signed(i32),
    /// ASCII text
    Ascii(String),
    /// Uninterpreted bytes
    Raw(Bytes),
    /// Code with its label, when the table knows it
    Labeled {
        /// Numeric code
        value: u32,
        /// Human label
        label: Option<&'static str>,
    },
}

impl FieldValue {
    /// Numeric value as unsigned, if this is a numeric field
    #[must_use]
    pub fn as_unsigned(&self) -> Option<u32> {
        match self {
            Self::Unsigned(value) | Self::Labeled { value, .. } => Some(*value),
            Self::Signed(value) => u32::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Numeric value as signed, if this is a numeric field
    #[must_use]
    pub fn as_signed(&self) -> Option<i32> {
        match self {
            Self::Signed(value) => Some(*value),
            Self::Unsigned(value) | Self::Labeled { value, .. } => i32::try_from(*value).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(value) => write!(f, "{value}"),
            Self::Signed(value) => write!(f, "{value}"),
            Self::Ascii(text) => write!(f, "{text:?}"),
            Self::Raw(bytes) => write!(f, "{bytes:02x?}"),
            Self::Labeled {
                value,
                label: Some(label),
            } => write!(f, "{label} ({value})"),
            Self::Labeled { value, label: None } => write!(f, "{value}"),
        }
    }
}

/// Named fields in descriptor order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Fields(Vec<(&'static str, FieldValue)>);

impl Fields {
    /// Create empty with room for `capacity` fields
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub(crate) fn push(&mut self, name: &'static str, value: FieldValue) {
        self.0.push((name, value));
    }

    /// Look up a field by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Unsigned value of a field
    #[must_use]
    pub fn unsigned(&self, name: &str) -> Option<u32> {
        self.get(name)?.as_unsigned()
    }

    /// Signed value of a field
    #[must_use]
    pub fn signed(&self, name: &str) -> Option<i32> {
        self.get(name)?.as_signed()
    }

    /// Text of an ASCII field
    #[must_use]
    pub fn ascii(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Ascii(text) => Some(text),
            _ => None,
        }
    }

    /// Label of a coded field
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&'static str> {
        match self.get(name)? {
            FieldValue::Labeled { label, .. } => *label,
            _ => None,
        }
    }

    /// Iterate fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (*name, value))
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A named async event with its decoded fields
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AsyncEvent {
    /// Event id code
    pub id: u8,
    /// Event name
    pub name: &'static str,
    /// Human description
    pub description: &'static str,
    /// Decoded fields
    pub fields: Fields,
}

/// Outcome of decoding one event frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Event described by the descriptor table
    Async(AsyncEvent),
    /// Streaming sensor samples
    SensorData(SensorData),
    /// Event id the table does not know; carried raw
    Unknown(Frame),
}

impl Event {
    /// Event name, `"unknown"` for unrecognized ids
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Async(event) => event.name,
            Self::SensorData(_) => "data_streaming",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Decode an async event frame
///
/// Data-streaming frames decode against `mask`, the selection most recently
/// sent with `set_data_streaming`. With no selection on record they come back
/// as [`Event::Unknown`].
///
/// # Errors
///
/// Returns [`crate::Error::MalformedEvent`] when a descriptor runs past the
/// payload.
pub fn decode_event(frame: &Frame, mask: StreamingMask) -> Result<Event> {
    let id = frame.event_id();

    if id == ids::DATA_STREAMING {
        if mask.is_empty() {
            trace!("streaming frame with no active mask");
            return Ok(Event::Unknown(frame.clone()));
        }
        return SensorData::decode(mask, frame.payload()).map(Event::SensorData);
    }

    let Some(desc) = catalog().event(id) else {
        trace!(id, "unrecognized event id");
        return Ok(Event::Unknown(frame.clone()));
    };

    let fields = desc.decode(frame.payload())?;
    Ok(Event::Async(AsyncEvent {
        id,
        name: desc.name,
        description: desc.description,
        fields,
    }))
}

/// Decode the payload of a response to `(device, command)`
///
/// Commands without a descriptor decode to no fields.
pub fn decode_response(device: u8, command: u8, payload: &Bytes) -> Result<Fields> {
    match catalog().response(device, command) {
        Some(desc) => desc.decode(payload),
        None => Ok(Fields::default()),
    }
}
