//! Field descriptors and the static descriptor tables
//!
//! Each descriptor is plain data: a byte range within the payload (inclusive
//! on both ends), a value type, and for coded fields a label table.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;

use super::{FieldValue, Fields};
use crate::commands::{core_ops, robot_ops};
use crate::protocol::{Error, Result};

/// How a byte range is turned into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Big-endian unsigned integer, 1-4 bytes
    Unsigned,
    /// Big-endian two's complement integer, 1-4 bytes
    Signed,
    /// ASCII text, trailing NULs trimmed
    Ascii,
    /// Bytes passed through untouched
    Raw,
    /// Unsigned code with a human label table
    Labeled(&'static [(u32, &'static str)]),
}

/// Location and type of one named field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: &'static str,
    /// First payload byte
    pub start: usize,
    /// Last payload byte, or `None` for "through the end of the payload"
    pub end: Option<usize>,
    /// Value type
    pub kind: FieldKind,
}

impl FieldDescriptor {
    const fn new(name: &'static str, start: usize, end: usize, kind: FieldKind) -> Self {
        Self {
            name,
            start,
            end: Some(end),
            kind,
        }
    }

    const fn rest(name: &'static str, start: usize, kind: FieldKind) -> Self {
        Self {
            name,
            start,
            end: None,
            kind,
        }
    }

    /// Extract this field from a payload
    ///
    /// `id` only labels the error when the range runs past the payload.
    pub fn extract(&self, id: u8, payload: &Bytes) -> Result<FieldValue> {
        let end = match self.end {
            Some(end) => end,
            None => payload.len().max(self.start + 1) - 1,
        };

        if end >= payload.len() || self.start > end {
            if self.end.is_none() && self.start == payload.len() {
                return Ok(empty_value(self.kind));
            }
            return Err(Error::MalformedEvent {
                id,
                field: self.name,
                needed: end + 1,
                got: payload.len(),
            });
        }

        let bytes = payload.slice(self.start..=end);
        let value = match self.kind {
            FieldKind::Unsigned => FieldValue::Unsigned(read_unsigned(&bytes)),
            FieldKind::Signed => FieldValue::Signed(read_signed(&bytes)),
            FieldKind::Ascii => FieldValue::Ascii(read_ascii(&bytes)),
            FieldKind::Raw => FieldValue::Raw(bytes),
            FieldKind::Labeled(table) => {
                let value = read_unsigned(&bytes);
                let label = table
                    .iter()
                    .find(|(code, _)| *code == value)
                    .map(|(_, label)| *label);
                FieldValue::Labeled { value, label }
            }
        };
        Ok(value)
    }
}

fn empty_value(kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Ascii => FieldValue::Ascii(String::new()),
        _ => FieldValue::Raw(Bytes::new()),
    }
}

/// Big-endian unsigned value of the low four bytes
#[must_use]
pub fn read_unsigned(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)) as u32
}

/// Big-endian signed value, sign-extended from the field width
#[must_use]
pub fn read_signed(bytes: &[u8]) -> i32 {
    let width = bytes.len().min(4);
    if width == 0 {
        return 0;
    }
    let raw = read_unsigned(bytes);
    let shift = 32 - 8 * width as u32;
    ((raw << shift) as i32) >> shift
}

fn read_ascii(bytes: &[u8]) -> String {
    let text: String = bytes.iter().map(|b| char::from(*b)).collect();
    text.trim_end_matches('\0').to_string()
}

/// How to decode one event id or one command's response
#[derive(Debug, Clone, Copy)]
pub struct EventDescriptor {
    /// Event id code, or command id for response descriptors
    pub id: u8,
    /// Short event name
    pub name: &'static str,
    /// Human description
    pub description: &'static str,
    /// Ordered fields
    pub fields: &'static [FieldDescriptor],
}

impl EventDescriptor {
    /// Decode every field from a payload
    pub fn decode(&self, payload: &Bytes) -> Result<Fields> {
        let mut fields = Fields::with_capacity(self.fields.len());
        for field in self.fields {
            fields.push(field.name, field.extract(self.id, payload)?);
        }
        Ok(fields)
    }
}

/// Async event id codes
pub mod ids {
    /// Battery power state changed
    pub const BATTERY_STATE: u8 = 0x01;
    /// Level 1 diagnostic text
    pub const LEVEL1_DIAGNOSTIC: u8 = 0x02;
    /// Streaming sensor data
    pub const DATA_STREAMING: u8 = 0x03;
    /// Config block contents
    pub const CONFIG_BLOCK: u8 = 0x04;
    /// Going to sleep in 10 seconds
    pub const PRE_SLEEP_WARNING: u8 = 0x05;
    /// Macro marker reached
    pub const MACRO_MARKER: u8 = 0x06;
    /// Collision detected
    pub const COLLISION: u8 = 0x07;
    /// orbBasic PRINT output
    pub const ORB_BASIC_PRINT: u8 = 0x08;
    /// orbBasic error, ASCII form
    pub const ORB_BASIC_ERROR_ASCII: u8 = 0x09;
    /// orbBasic error, binary form
    pub const ORB_BASIC_ERROR_BINARY: u8 = 0x0A;
    /// Self level finished
    pub const SELF_LEVEL_RESULT: u8 = 0x0B;
    /// Gyro axis limit exceeded
    pub const GYRO_AXIS_LIMIT: u8 = 0x0C;
    /// Soul data block
    pub const SOUL_DATA: u8 = 0x0D;
    /// Robot leveled up
    pub const LEVEL_UP: u8 = 0x0E;
    /// Shield damage
    pub const SHIELD_DAMAGE: u8 = 0x0F;
    /// XP update
    pub const XP_UPDATE: u8 = 0x10;
    /// Boost update
    pub const BOOST_UPDATE: u8 = 0x11;
}

use FieldKind::{Ascii, Labeled, Raw, Signed, Unsigned};

const BATTERY_STATES: &[(u32, &str)] = &[
    (0x01, "charging"),
    (0x02, "ok"),
    (0x03, "low"),
    (0x04, "critical"),
];

const SELF_LEVEL_RESULTS: &[(u32, &str)] = &[
    (0x00, "unknown"),
    (0x01, "timed out"),
    (0x02, "sensors error"),
    (0x03, "self level disabled"),
    (0x04, "aborted"),
    (0x05, "charger not found"),
    (0x06, "success"),
];

const DEVICE_MODES: &[(u32, &str)] = &[(0x00, "normal"), (0x01, "user hack")];

static ASYNC_EVENTS: &[EventDescriptor] = &[
    EventDescriptor {
        id: ids::BATTERY_STATE,
        name: "battery_state",
        description: "Battery power state",
        fields: &[FieldDescriptor::new("state", 0, 0, Labeled(BATTERY_STATES))],
    },
    EventDescriptor {
        id: ids::LEVEL1_DIAGNOSTIC,
        name: "level1_diagnostic",
        description: "Level 1 diagnostic response",
        fields: &[FieldDescriptor::rest("diagnostic", 0, Ascii)],
    },
    EventDescriptor {
        id: ids::CONFIG_BLOCK,
        name: "config_block",
        description: "Config block contents",
        fields: &[FieldDescriptor::rest("content", 0, Raw)],
    },
    EventDescriptor {
        id: ids::PRE_SLEEP_WARNING,
        name: "pre_sleep_warning",
        description: "Pre-sleep warning (10 sec)",
        fields: &[],
    },
    EventDescriptor {
        id: ids::MACRO_MARKER,
        name: "macro_marker",
        description: "Macro markers",
        fields: &[
            FieldDescriptor::new("marker", 0, 0, Unsigned),
            FieldDescriptor::new("macro_id", 1, 1, Unsigned),
            FieldDescriptor::new("command_number", 2, 3, Unsigned),
        ],
    },
    EventDescriptor {
        id: ids::COLLISION,
        name: "collision",
        description: "Collision detected",
        fields: &[
            FieldDescriptor::new("x", 0, 1, Signed),
            FieldDescriptor::new("y", 2, 3, Signed),
            FieldDescriptor::new("z", 4, 5, Signed),
            FieldDescriptor::new("axis", 6, 6, Unsigned),
            FieldDescriptor::new("x_magnitude", 7, 8, Signed),
            FieldDescriptor::new("y_magnitude", 9, 10, Signed),
            FieldDescriptor::new("speed", 11, 11, Unsigned),
            FieldDescriptor::new("timestamp", 12, 15, Unsigned),
        ],
    },
    EventDescriptor {
        id: ids::ORB_BASIC_PRINT,
        name: "orb_basic_print",
        description: "orbBasic PRINT message",
        fields: &[FieldDescriptor::rest("content", 0, Ascii)],
    },
    EventDescriptor {
        id: ids::ORB_BASIC_ERROR_ASCII,
        name: "orb_basic_error_ascii",
        description: "orbBasic error message, ASCII",
        fields: &[FieldDescriptor::rest("content", 0, Ascii)],
    },
    EventDescriptor {
        id: ids::ORB_BASIC_ERROR_BINARY,
        name: "orb_basic_error_binary",
        description: "orbBasic error message, binary",
        fields: &[FieldDescriptor::rest("content", 0, Raw)],
    },
    EventDescriptor {
        id: ids::SELF_LEVEL_RESULT,
        name: "self_level_result",
        description: "Self level result",
        fields: &[FieldDescriptor::new("result", 0, 0, Labeled(SELF_LEVEL_RESULTS))],
    },
    EventDescriptor {
        id: ids::GYRO_AXIS_LIMIT,
        name: "gyro_axis_limit",
        description: "Gyro axis limit exceeded",
        fields: &[FieldDescriptor::new("axes", 0, 0, Unsigned)],
    },
    EventDescriptor {
        id: ids::SOUL_DATA,
        name: "soul_data",
        description: "Sphero's soul data",
        fields: &[FieldDescriptor::rest("content", 0, Raw)],
    },
    EventDescriptor {
        id: ids::LEVEL_UP,
        name: "level_up",
        description: "Level up",
        fields: &[
            FieldDescriptor::new("robot_level", 0, 1, Unsigned),
            FieldDescriptor::new("attribute_points", 2, 3, Unsigned),
        ],
    },
    EventDescriptor {
        id: ids::SHIELD_DAMAGE,
        name: "shield_damage",
        description: "Shield damage",
        fields: &[FieldDescriptor::new("robot_level", 0, 0, Unsigned)],
    },
    EventDescriptor {
        id: ids::XP_UPDATE,
        name: "xp_update",
        description: "XP update",
        fields: &[
            FieldDescriptor::new("cores", 0, 1, Unsigned),
            FieldDescriptor::new("xp", 2, 3, Unsigned),
        ],
    },
    EventDescriptor {
        id: ids::BOOST_UPDATE,
        name: "boost_update",
        description: "Boost update",
        fields: &[FieldDescriptor::new("boost", 0, 1, Unsigned)],
    },
];

static RESPONSES: &[(u8, EventDescriptor)] = &[
    (
        core_ops::DEVICE,
        EventDescriptor {
            id: core_ops::VERSION.command,
            name: "version",
            description: "Versioning",
            fields: &[
                FieldDescriptor::new("record_version", 0, 0, Unsigned),
                FieldDescriptor::new("model", 1, 1, Unsigned),
                FieldDescriptor::new("hardware", 2, 2, Unsigned),
                FieldDescriptor::new("main_app_version", 3, 3, Unsigned),
                FieldDescriptor::new("main_app_revision", 4, 4, Unsigned),
                FieldDescriptor::new("bootloader", 5, 5, Unsigned),
                FieldDescriptor::new("orb_basic", 6, 6, Unsigned),
                FieldDescriptor::new("macro_executive", 7, 7, Unsigned),
                FieldDescriptor::new("api_major", 8, 8, Unsigned),
                FieldDescriptor::new("api_minor", 9, 9, Unsigned),
            ],
        },
    ),
    (
        core_ops::DEVICE,
        EventDescriptor {
            id: core_ops::GET_BLUETOOTH_INFO.command,
            name: "bluetooth_info",
            description: "Bluetooth info",
            fields: &[
                FieldDescriptor::new("name", 0, 15, Ascii),
                FieldDescriptor::new("address", 16, 27, Ascii),
                FieldDescriptor::new("separator", 28, 28, Unsigned),
                FieldDescriptor::new("colors", 29, 31, Raw),
            ],
        },
    ),
    (
        core_ops::DEVICE,
        EventDescriptor {
            id: core_ops::GET_AUTO_RECONNECT.command,
            name: "auto_reconnect",
            description: "Auto-reconnect setting",
            fields: &[
                FieldDescriptor::new("enabled", 0, 0, Unsigned),
                FieldDescriptor::new("seconds", 1, 1, Unsigned),
            ],
        },
    ),
    (
        core_ops::DEVICE,
        EventDescriptor {
            id: core_ops::GET_POWER_STATE.command,
            name: "power_state",
            description: "Power state",
            fields: &[
                FieldDescriptor::new("record_version", 0, 0, Unsigned),
                FieldDescriptor::new("battery_state", 1, 1, Labeled(BATTERY_STATES)),
                FieldDescriptor::new("battery_voltage", 2, 3, Unsigned),
                FieldDescriptor::new("charge_count", 4, 5, Unsigned),
                FieldDescriptor::new("seconds_since_charge", 6, 7, Unsigned),
            ],
        },
    ),
    (
        core_ops::DEVICE,
        EventDescriptor {
            id: core_ops::GET_VOLTAGE_TRIP_POINTS.command,
            name: "voltage_trip_points",
            description: "Voltage trip points",
            fields: &[
                FieldDescriptor::new("low", 0, 1, Unsigned),
                FieldDescriptor::new("critical", 2, 3, Unsigned),
            ],
        },
    ),
    (
        core_ops::DEVICE,
        EventDescriptor {
            id: core_ops::RUN_L2_DIAGS.command,
            name: "level2_diagnostics",
            description: "Level 2 diagnostics counters",
            fields: &[
                FieldDescriptor::new("record_version", 0, 1, Unsigned),
                FieldDescriptor::new("rx_good", 3, 6, Unsigned),
                FieldDescriptor::new("rx_bad_device_id", 7, 10, Unsigned),
                FieldDescriptor::new("rx_bad_length", 11, 14, Unsigned),
                FieldDescriptor::new("rx_bad_command_id", 15, 18, Unsigned),
                FieldDescriptor::new("rx_bad_checksum", 19, 22, Unsigned),
                FieldDescriptor::new("rx_buffer_overrun", 23, 26, Unsigned),
                FieldDescriptor::new("tx_messages", 27, 30, Unsigned),
                FieldDescriptor::new("tx_buffer_overrun", 31, 34, Unsigned),
            ],
        },
    ),
    (
        core_ops::DEVICE,
        EventDescriptor {
            id: core_ops::POLL_PACKET_TIMES.command,
            name: "packet_times",
            description: "Poll packet times",
            fields: &[
                FieldDescriptor::new("client_tx", 0, 3, Unsigned),
                FieldDescriptor::new("robot_rx", 4, 7, Unsigned),
                FieldDescriptor::new("robot_tx", 8, 11, Unsigned),
            ],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::GET_CHASSIS_ID.command,
            name: "chassis_id",
            description: "Chassis id",
            fields: &[FieldDescriptor::new("chassis_id", 0, 1, Unsigned)],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::READ_LOCATOR.command,
            name: "locator",
            description: "Locator position and velocity",
            fields: &[
                FieldDescriptor::new("x", 0, 1, Signed),
                FieldDescriptor::new("y", 2, 3, Signed),
                FieldDescriptor::new("x_velocity", 4, 5, Signed),
                FieldDescriptor::new("y_velocity", 6, 7, Signed),
                FieldDescriptor::new("speed_over_ground", 8, 9, Unsigned),
            ],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::GET_RGB_LED.command,
            name: "rgb_led",
            description: "User LED color",
            fields: &[
                FieldDescriptor::new("red", 0, 0, Unsigned),
                FieldDescriptor::new("green", 1, 1, Unsigned),
                FieldDescriptor::new("blue", 2, 2, Unsigned),
            ],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::GET_PERM_OPTION_FLAGS.command,
            name: "permanent_option_flags",
            description: "Permanent option flags",
            fields: &[FieldDescriptor::new("flags", 0, 3, Unsigned)],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::GET_TEMP_OPTION_FLAGS.command,
            name: "temporary_option_flags",
            description: "Temporary option flags",
            fields: &[FieldDescriptor::new("flags", 0, 3, Unsigned)],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::GET_DEVICE_MODE.command,
            name: "device_mode",
            description: "Device mode",
            fields: &[FieldDescriptor::new("mode", 0, 0, Labeled(DEVICE_MODES))],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::GET_PASSWORD_SEED.command,
            name: "password_seed",
            description: "Password seed",
            fields: &[FieldDescriptor::new("seed", 0, 3, Unsigned)],
        },
    ),
    (
        robot_ops::DEVICE,
        EventDescriptor {
            id: robot_ops::MACRO_STATUS.command,
            name: "macro_status",
            description: "Macro executive status",
            fields: &[
                FieldDescriptor::new("macro_id", 0, 0, Unsigned),
                FieldDescriptor::new("command_number", 1, 2, Unsigned),
            ],
        },
    ),
];

/// Immutable lookup over the descriptor tables, built once.
#[derive(Debug)]
pub struct DescriptorCatalog {
    events: HashMap<u8, &'static EventDescriptor>,
    responses: HashMap<(u8, u8), &'static EventDescriptor>,
}

impl DescriptorCatalog {
    fn load() -> Self {
        let events = ASYNC_EVENTS.iter().map(|desc| (desc.id, desc)).collect();
        let responses = RESPONSES
            .iter()
            .map(|(device, desc)| ((*device, desc.id), desc))
            .collect();
        Self { events, responses }
    }

    /// Descriptor for an async event id
    #[must_use]
    pub fn event(&self, id: u8) -> Option<&'static EventDescriptor> {
        self.events.get(&id).copied()
    }

    /// Descriptor for the response to a (device, command) pair
    #[must_use]
    pub fn response(&self, device: u8, command: u8) -> Option<&'static EventDescriptor> {
        self.responses.get(&(device, command)).copied()
    }

    /// Every async event descriptor
    pub fn events(&self) -> impl Iterator<Item = &'static EventDescriptor> + '_ {
        self.events.values().copied()
    }

    /// Every response descriptor, keyed by (device, command)
    pub fn responses(&self) -> impl Iterator<Item = ((u8, u8), &'static EventDescriptor)> + '_ {
        self.responses.iter().map(|(key, desc)| (*key, *desc))
    }
}

static CATALOG: LazyLock<DescriptorCatalog> = LazyLock::new(DescriptorCatalog::load);

/// The process-wide descriptor catalog
#[must_use]
pub fn catalog() -> &'static DescriptorCatalog {
    &CATALOG
}
