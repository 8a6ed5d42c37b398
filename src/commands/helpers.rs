//! Convenience operations composed from the raw catalog

use std::future::Future;

use super::{CollisionConfig, Commander, Response, RobotCommands, StreamingConfig};
use crate::events::StreamingMask;
use crate::protocol::Result;
use crate::protocol::pack::rgb;

/// Temporary option flag: stop rolling when the link drops
const STOP_ON_DISCONNECT: u32 = 0x01;

/// Back LED brightness while aiming
const CALIBRATION_BRIGHTNESS: u8 = 127;

/// Higher-level operations on top of [`RobotCommands`]
pub trait Helpers: RobotCommands {
    /// Set the main LED from a packed `0xRRGGBB` value
    fn set_color(&self, color: u32) -> impl Future<Output = Result<Response>> + Send {
        let [red, green, blue] = rgb(color);
        self.set_rgb_led(red, green, blue, false)
    }

    /// Light the aiming LED and free the heading so the robot can be turned by hand
    fn start_calibration(&self) -> impl Future<Output = Result<Response>> + Send {
        async move {
            self.set_back_led(CALIBRATION_BRIGHTNESS).await?;
            self.set_stabilization(false).await
        }
    }

    /// Adopt the current orientation as heading zero and restore stabilization
    fn finish_calibration(&self) -> impl Future<Output = Result<Response>> + Send {
        async move {
            self.set_heading(0).await?;
            self.set_back_led(0).await?;
            self.set_stabilization(true).await
        }
    }

    /// Enable collision events with the firmware's recommended thresholds
    fn detect_collisions(&self) -> impl Future<Output = Result<Response>> + Send {
        self.configure_collisions(CollisionConfig::default())
    }

    /// Ask the robot to stop when the connection drops, or stop asking
    fn stop_on_disconnect(&self, enabled: bool) -> impl Future<Output = Result<Response>> + Send {
        let flags = if enabled { STOP_ON_DISCONNECT } else { 0 };
        self.set_temporary_option_flags(flags)
    }

    /// Add `sensors` to the streaming selection, or remove them
    ///
    /// Streaming restarts at `samples_per_second` with whatever remains
    /// selected; removing the last sensor stops it.
    fn stream(
        &self,
        sensors: StreamingMask,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        async move {
            let current = self.streaming_mask();
            let mask = if remove {
                current.without(sensors)
            } else {
                current | sensors
            };
            self.set_data_streaming(StreamingConfig::at_rate(mask, samples_per_second))
                .await
        }
    }

    /// Stream odometer X/Y in centimeters
    fn stream_odometer(
        &self,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.stream(StreamingMask::ODOMETER, samples_per_second, remove)
    }

    /// Stream velocity X/Y in mm/s
    fn stream_velocity(
        &self,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.stream(StreamingMask::VELOCITY, samples_per_second, remove)
    }

    /// Stream the acceleration magnitude
    fn stream_accel_one(
        &self,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.stream(StreamingMask::ACCEL_ONE, samples_per_second, remove)
    }

    /// Stream pitch, roll and yaw
    fn stream_imu_angles(
        &self,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.stream(StreamingMask::IMU_ANGLES, samples_per_second, remove)
    }

    /// Stream the filtered accelerometer
    fn stream_accelerometer(
        &self,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.stream(StreamingMask::ACCELEROMETER, samples_per_second, remove)
    }

    /// Stream the filtered gyroscope
    fn stream_gyroscope(
        &self,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.stream(StreamingMask::GYROSCOPE, samples_per_second, remove)
    }

    /// Stream back EMF of both motors
    fn stream_motors_back_emf(
        &self,
        samples_per_second: u16,
        remove: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.stream(StreamingMask::MOTORS_BACK_EMF, samples_per_second, remove)
    }
}

impl<T: Commander> Helpers for T {}
