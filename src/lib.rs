//! Spheric - binary protocol engine for small spherical robots
//!
//! This library speaks the robot's framed command/response protocol over any
//! byte stream: a serial adaptor, a Bluetooth bridge, or an in-memory pipe in
//! tests. It encodes commands, correlates responses by sequence number and
//! decodes unsolicited events (collisions, power changes, sensor streams).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use spheric::{Device, DeviceConfig, DeviceEvent, Helpers, RobotCommands};
//!
//! # async fn run(port: tokio::io::DuplexStream) -> spheric::Result<()> {
//! let robot = Device::open(port, DeviceConfig::default());
//! let mut events = robot.subscribe();
//!
//! robot.set_color(0x00FF_0000).await?;
//! robot.detect_collisions().await?;
//! robot.roll(128, 90).await?;
//!
//! while let Ok(update) = events.recv().await {
//!     match update {
//!         DeviceEvent::Event(event) => println!("{}", event.name()),
//!         DeviceEvent::Closed => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Layers
//!
//! - [`protocol`] - frame layout, checksum, codec and argument packing
//! - [`dispatch`] - sequence allocation and response correlation
//! - [`events`] - table-driven async event and response decoding
//! - [`commands`] - opcode catalog and typed command traits
//! - [`device`] - async device handle tying the layers to a transport

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]

pub mod commands;
pub mod device;
pub mod dispatch;
pub mod events;
pub mod protocol;

pub use commands::{
    CollisionConfig, Commander, CoreCommands, Helpers, Opcode, Response, RobotCommands,
    StreamingConfig,
};
pub use device::{Device, DeviceConfig, DeviceEvent};
pub use dispatch::Dispatcher;
pub use events::{AsyncEvent, Event, FieldValue, Fields, SensorData, StreamingMask};
pub use protocol::{
    Error, Frame, FrameDecoder, FrameKind, MAX_PAYLOAD_SIZE, MetricsSnapshot, Options,
    ResponseCode, Result, metrics_snapshot,
};
