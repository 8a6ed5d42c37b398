//! Streaming sensor mask table and sample decoding
//!
//! `set_data_streaming` selects sensors with two 32-bit masks. Each selected
//! sensor contributes one signed 16-bit big-endian reading per sample, in
//! table order: mask 1 from its high bit down, then mask 2.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use bytes::Bytes;

use super::descriptor::ids;
use super::read_signed;
use crate::protocol::{Error, Result};

/// Which of the two streaming masks a sensor bit lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MaskWord {
    /// First mask (`MASK`)
    First,
    /// Second mask (`MASK2`)
    Second,
}

/// One streamable sensor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sensor {
    /// Channel name
    pub name: &'static str,
    /// Mask word holding the selection bit
    pub word: MaskWord,
    /// Selection bit
    pub bit: u32,
    /// Lowest value the firmware reports
    pub min: i32,
    /// Highest value the firmware reports
    pub max: i32,
    /// Physical units of one count
    pub units: &'static str,
}

const fn sensor(
    name: &'static str,
    word: MaskWord,
    bit: u32,
    min: i32,
    max: i32,
    units: &'static str,
) -> Sensor {
    Sensor {
        name,
        word,
        bit,
        min,
        max,
        units,
    }
}

use MaskWord::{First, Second};

/// Every streamable channel in wire order
pub static SENSORS: &[Sensor] = &[
    sensor("accel_x_raw", First, 0x8000_0000, -2048, 2047, "4mG"),
    sensor("accel_y_raw", First, 0x4000_0000, -2048, 2047, "4mG"),
    sensor("accel_z_raw", First, 0x2000_0000, -2048, 2047, "4mG"),
    sensor("gyro_x_raw", First, 0x1000_0000, -32768, 32767, "0.068 degrees"),
    sensor("gyro_y_raw", First, 0x0800_0000, -32768, 32767, "0.068 degrees"),
    sensor("gyro_z_raw", First, 0x0400_0000, -32768, 32767, "0.068 degrees"),
    sensor("right_motor_emf_raw", First, 0x0040_0000, -32768, 32767, "22.5 cm"),
    sensor("left_motor_emf_raw", First, 0x0020_0000, -32768, 32767, "22.5 cm"),
    sensor("left_motor_pwm_raw", First, 0x0010_0000, -2048, 2047, "duty cycle"),
    sensor("right_motor_pwm_raw", First, 0x0008_0000, -2048, 2047, "duty cycle"),
    sensor("imu_pitch", First, 0x0004_0000, -179, 180, "degrees"),
    sensor("imu_roll", First, 0x0002_0000, -179, 180, "degrees"),
    sensor("imu_yaw", First, 0x0001_0000, -179, 180, "degrees"),
    sensor("accel_x", First, 0x0000_8000, -32768, 32767, "1/4096 G"),
    sensor("accel_y", First, 0x0000_4000, -32768, 32767, "1/4096 G"),
    sensor("accel_z", First, 0x0000_2000, -32768, 32767, "1/4096 G"),
    sensor("gyro_x", First, 0x0000_1000, -20000, 20000, "0.1 dps"),
    sensor("gyro_y", First, 0x0000_0800, -20000, 20000, "0.1 dps"),
    sensor("gyro_z", First, 0x0000_0400, -20000, 20000, "0.1 dps"),
    sensor("right_motor_emf", First, 0x0000_0040, -32768, 32767, "22.5 cm"),
    sensor("left_motor_emf", First, 0x0000_0020, -32768, 32767, "22.5 cm"),
    sensor("quaternion_q0", Second, 0x8000_0000, -10000, 10000, "1/10000 Q"),
    sensor("quaternion_q1", Second, 0x4000_0000, -10000, 10000, "1/10000 Q"),
    sensor("quaternion_q2", Second, 0x2000_0000, -10000, 10000, "1/10000 Q"),
    sensor("quaternion_q3", Second, 0x1000_0000, -10000, 10000, "1/10000 Q"),
    sensor("odometer_x", Second, 0x0800_0000, -32768, 32767, "cm"),
    sensor("odometer_y", Second, 0x0400_0000, -32768, 32767, "cm"),
    sensor("accel_one", Second, 0x0200_0000, 0, 8000, "mG"),
    sensor("velocity_x", Second, 0x0100_0000, -32768, 32767, "mm/s"),
    sensor("velocity_y", Second, 0x0080_0000, -32768, 32767, "mm/s"),
];

/// Sensor selection for data streaming
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamingMask {
    /// First mask word
    pub mask1: u32,
    /// Second mask word
    pub mask2: u32,
}

impl StreamingMask {
    /// Nothing selected
    pub const NONE: Self = Self::new(0, 0);
    /// Raw accelerometer, three axes
    pub const ACCELEROMETER_RAW: Self = Self::new(0xE000_0000, 0);
    /// Raw gyroscope, three axes
    pub const GYROSCOPE_RAW: Self = Self::new(0x1C00_0000, 0);
    /// Raw motor back EMF, both motors
    pub const MOTORS_BACK_EMF_RAW: Self = Self::new(0x0060_0000, 0);
    /// Raw motor PWM, both motors
    pub const MOTORS_PWM_RAW: Self = Self::new(0x0018_0000, 0);
    /// Filtered pitch, roll and yaw
    pub const IMU_ANGLES: Self = Self::new(0x0007_0000, 0);
    /// Filtered accelerometer, three axes
    pub const ACCELEROMETER: Self = Self::new(0x0000_E000, 0);
    /// Filtered gyroscope, three axes
    pub const GYROSCOPE: Self = Self::new(0x0000_1C00, 0);
    /// Filtered motor back EMF, both motors
    pub const MOTORS_BACK_EMF: Self = Self::new(0x0000_0060, 0);
    /// Orientation quaternion
    pub const QUATERNION: Self = Self::new(0, 0xF000_0000);
    /// Odometer X and Y
    pub const ODOMETER: Self = Self::new(0, 0x0C00_0000);
    /// Acceleration magnitude
    pub const ACCEL_ONE: Self = Self::new(0, 0x0200_0000);
    /// Velocity X and Y
    pub const VELOCITY: Self = Self::new(0, 0x0180_0000);

    /// Create from both words
    #[must_use]
    pub const fn new(mask1: u32, mask2: u32) -> Self {
        Self { mask1, mask2 }
    }

    /// Check if no sensor is selected
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.mask1 == 0 && self.mask2 == 0
    }

    /// Check if every bit of `other` is selected
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.mask1 & other.mask1 == other.mask1 && self.mask2 & other.mask2 == other.mask2
    }

    /// Same selection without the bits of `other`
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self::new(self.mask1 & !other.mask1, self.mask2 & !other.mask2)
    }

    /// Selected sensors in wire order
    pub fn sensors(self) -> impl Iterator<Item = &'static Sensor> {
        SENSORS.iter().filter(move |sensor| match sensor.word {
            First => self.mask1 & sensor.bit != 0,
            Second => self.mask2 & sensor.bit != 0,
        })
    }

    /// Bytes per sample for this selection
    #[must_use]
    pub fn sample_size(self) -> usize {
        self.sensors().count() * 2
    }

    /// Pack both words into one value (`mask1` high)
    #[must_use]
    pub const fn to_u64(self) -> u64 {
        ((self.mask1 as u64) << 32) | self.mask2 as u64
    }

    /// Unpack from [`StreamingMask::to_u64`]
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self::new((value >> 32) as u32, value as u32)
    }
}

impl BitOr for StreamingMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::new(self.mask1 | rhs.mask1, self.mask2 | rhs.mask2)
    }
}

impl BitOrAssign for StreamingMask {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl fmt::Display for StreamingMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}:{:#010x}", self.mask1, self.mask2)
    }
}

/// One reading with its channel metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SensorReading {
    /// Channel the value came from
    pub sensor: &'static Sensor,
    /// Raw value as reported
    pub value: i32,
}

impl SensorReading {
    /// Check if the value lies within the channel's declared range
    #[must_use]
    pub const fn in_range(&self) -> bool {
        self.value >= self.sensor.min && self.value <= self.sensor.max
    }
}

/// All readings from one streaming sample
pub type Sample = Vec<SensorReading>;

/// Decoded data-streaming frame; may pack several samples
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SensorData {
    /// Mask the samples were decoded against
    pub mask: StreamingMask,
    /// Samples in arrival order
    pub samples: Vec<Sample>,
}

impl SensorData {
    /// Decode a streaming payload against the active mask
    pub fn decode(mask: StreamingMask, payload: &Bytes) -> Result<Self> {
        let sample_size = mask.sample_size();
        if sample_size == 0 || payload.is_empty() || payload.len() % sample_size != 0 {
            let needed = sample_size.max(1) * (payload.len() / sample_size.max(1) + 1);
            return Err(Error::MalformedEvent {
                id: ids::DATA_STREAMING,
                field: "sample",
                needed,
                got: payload.len(),
            });
        }

        let samples = payload
            .chunks(sample_size)
            .map(|chunk| {
                mask.sensors()
                    .zip(chunk.chunks(2))
                    .map(|(sensor, bytes)| SensorReading {
                        sensor,
                        value: read_signed(bytes),
                    })
                    .collect()
            })
            .collect();

        Ok(Self { mask, samples })
    }

    /// Latest reading for a channel
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<i32> {
        self.samples
            .last()?
            .iter()
            .find(|reading| reading.sensor.name == name)
            .map(|reading| reading.value)
    }
}
