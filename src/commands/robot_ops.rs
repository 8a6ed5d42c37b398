//! Robot device (0x02): driving, lights, sensors, macros and orbBasic.

use std::future::Future;

use super::{Commander, Response};
use crate::events::StreamingMask;
use crate::protocol::Result;
use crate::protocol::pack::{flag, put_int};

/// Virtual device id of the robot table
pub const DEVICE: u8 = 0x02;

opcode_table! {
    DEVICE;
    SET_HEADING = 0x01, "set_heading";
    SET_STABILIZATION = 0x02, "set_stabilization";
    SET_ROTATION_RATE = 0x03, "set_rotation_rate";
    GET_CHASSIS_ID = 0x07, "get_chassis_id";
    SELF_LEVEL = 0x09, "self_level";
    SET_DATA_STREAMING = 0x11, "set_data_streaming";
    CONFIGURE_COLLISIONS = 0x12, "configure_collisions";
    CONFIGURE_LOCATOR = 0x13, "configure_locator";
    SET_ACCEL_RANGE = 0x14, "set_accel_range";
    READ_LOCATOR = 0x15, "read_locator";
    SET_RGB_LED = 0x20, "set_rgb_led";
    SET_BACK_LED = 0x21, "set_back_led";
    GET_RGB_LED = 0x22, "get_rgb_led";
    ROLL = 0x30, "roll";
    BOOST = 0x31, "boost";
    SET_RAW_MOTORS = 0x33, "set_raw_motors";
    SET_MOTION_TIMEOUT = 0x34, "set_motion_timeout";
    SET_PERM_OPTION_FLAGS = 0x35, "set_permanent_option_flags";
    GET_PERM_OPTION_FLAGS = 0x36, "get_permanent_option_flags";
    SET_TEMP_OPTION_FLAGS = 0x37, "set_temporary_option_flags";
    GET_TEMP_OPTION_FLAGS = 0x38, "get_temporary_option_flags";
    GET_CONFIG_BLOCK = 0x40, "get_config_block";
    SET_SSB_PARAMS = 0x41, "set_ssb_params";
    SET_DEVICE_MODE = 0x42, "set_device_mode";
    SET_CONFIG_BLOCK = 0x43, "set_config_block";
    GET_DEVICE_MODE = 0x44, "get_device_mode";
    GET_SSB = 0x46, "get_ssb";
    SET_SSB = 0x47, "set_ssb";
    SSB_REFILL = 0x48, "ssb_refill";
    SSB_BUY = 0x49, "ssb_buy";
    SSB_USE_CONSUMABLE = 0x4A, "ssb_use_consumable";
    SSB_GRANT_CORES = 0x4B, "ssb_grant_cores";
    SSB_ADD_XP = 0x4C, "ssb_add_xp";
    SSB_LEVEL_UP_ATTR = 0x4D, "ssb_level_up_attr";
    GET_PASSWORD_SEED = 0x4E, "get_password_seed";
    SSB_ENABLE_ASYNC = 0x4F, "ssb_enable_async";
    RUN_MACRO = 0x50, "run_macro";
    SAVE_TEMP_MACRO = 0x51, "save_temp_macro";
    SAVE_MACRO = 0x52, "save_macro";
    INIT_MACRO_EXECUTIVE = 0x54, "init_macro_executive";
    ABORT_MACRO = 0x55, "abort_macro";
    MACRO_STATUS = 0x56, "macro_status";
    SET_MACRO_PARAM = 0x57, "set_macro_param";
    APPEND_TEMP_MACRO_CHUNK = 0x58, "append_temp_macro_chunk";
    ERASE_ORB_BASIC_STORAGE = 0x60, "erase_orb_basic_storage";
    APPEND_ORB_BASIC_FRAGMENT = 0x61, "append_orb_basic_fragment";
    EXECUTE_ORB_BASIC_PROGRAM = 0x62, "execute_orb_basic_program";
    ABORT_ORB_BASIC_PROGRAM = 0x63, "abort_orb_basic_program";
    ANSWER_INPUT = 0x64, "answer_input";
    COMMIT_TO_FLASH = 0x65, "commit_to_flash";
}

/// Roll state byte meaning "drive"
pub const ROLL_GO: u8 = 0x01;

/// Roll state byte meaning "brake to a stop"
pub const ROLL_STOP: u8 = 0x00;

/// Arguments of `set_data_streaming`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamingConfig {
    /// Divisor of the 400 Hz sensor rate
    pub divisor: u16,
    /// Samples packed into each frame
    pub frames: u16,
    /// Sensors to stream
    pub mask: StreamingMask,
    /// Frames to send before stopping, 0 for unlimited
    pub packet_count: u8,
}

impl StreamingConfig {
    /// Stream `mask` at `samples_per_second`, one sample per frame, forever
    #[must_use]
    pub fn at_rate(mask: StreamingMask, samples_per_second: u16) -> Self {
        Self {
            divisor: 400 / samples_per_second.clamp(1, 400),
            frames: 1,
            mask,
            packet_count: 0,
        }
    }

    fn to_payload(self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(13);
        put_int(&mut payload, self.divisor.into(), 2);
        put_int(&mut payload, self.frames.into(), 2);
        put_int(&mut payload, self.mask.mask1.into(), 4);
        payload.push(self.packet_count);
        put_int(&mut payload, self.mask.mask2.into(), 4);
        payload
    }
}

/// Arguments of `configure_collisions`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionConfig {
    /// Detection method, 0 disables
    pub method: u8,
    /// X axis threshold
    pub x_threshold: u8,
    /// Speed-dependent X threshold
    pub x_speed: u8,
    /// Y axis threshold
    pub y_threshold: u8,
    /// Speed-dependent Y threshold
    pub y_speed: u8,
    /// Quiet time after a collision, in 10 ms units
    pub dead_time: u8,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            method: 0x01,
            x_threshold: 0x40,
            x_speed: 0x50,
            y_threshold: 0x40,
            y_speed: 0x50,
            dead_time: 0x50,
        }
    }
}

impl CollisionConfig {
    fn to_payload(self) -> Vec<u8> {
        vec![
            self.method,
            self.x_threshold,
            self.x_speed,
            self.y_threshold,
            self.y_speed,
            self.dead_time,
        ]
    }
}

fn with_password(password: u32, rest: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + rest.len());
    put_int(&mut payload, password.into(), 4);
    payload.extend_from_slice(rest);
    payload
}

fn u16_payload(value: u16) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Robot device commands
pub trait RobotCommands: Commander {
    /// Redefine the current orientation as `heading` degrees
    fn set_heading(&self, heading: u16) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_HEADING, u16_payload(heading))
    }

    /// Turn the internal stabilization control loop on or off
    fn set_stabilization(&self, enabled: bool) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_STABILIZATION, vec![flag(enabled)])
    }

    /// Yaw rate, in units of 0.784 degrees/s
    fn set_rotation_rate(&self, rate: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_ROTATION_RATE, vec![rate])
    }

    /// Hardware chassis identifier
    fn get_chassis_id(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_CHASSIS_ID, Vec::new())
    }

    /// Level the inner chassis; completion arrives as an async event
    fn self_level(
        &self,
        options: u8,
        angle_limit: u8,
        timeout: u8,
        true_time: u8,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SELF_LEVEL, vec![options, angle_limit, timeout, true_time])
    }

    /// Start or stop sensor streaming
    ///
    /// The mask is recorded before the command goes out so the first samples
    /// decode against it; it is restored if the command fails.
    fn set_data_streaming(
        &self,
        config: StreamingConfig,
    ) -> impl Future<Output = Result<Response>> + Send {
        async move {
            let previous = self.streaming_mask();
            self.set_streaming_mask(config.mask);
            let result = self.command(SET_DATA_STREAMING, config.to_payload()).await;
            if result.is_err() {
                self.set_streaming_mask(previous);
            }
            result
        }
    }

    /// Arm collision detection with the given thresholds
    fn configure_collisions(
        &self,
        config: CollisionConfig,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(CONFIGURE_COLLISIONS, config.to_payload())
    }

    /// Reset the locator origin and yaw tare
    fn configure_locator(
        &self,
        flags: u8,
        x: i16,
        y: i16,
        yaw_tare: i16,
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = vec![flags];
        for value in [x, y, yaw_tare] {
            payload.extend_from_slice(&value.to_be_bytes());
        }
        self.command(CONFIGURE_LOCATOR, payload)
    }

    /// Accelerometer full-scale range selector
    fn set_accel_range(&self, range: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_ACCEL_RANGE, vec![range])
    }

    /// Current position, velocity and ground speed
    fn read_locator(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(READ_LOCATOR, Vec::new())
    }

    /// Set the main LED; `persist` stores it as the default color
    fn set_rgb_led(
        &self,
        red: u8,
        green: u8,
        blue: u8,
        persist: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_RGB_LED, vec![red, green, blue, flag(persist)])
    }

    /// Brightness of the aiming LED
    fn set_back_led(&self, brightness: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_BACK_LED, vec![brightness])
    }

    /// User LED color as last set
    fn get_rgb_led(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_RGB_LED, Vec::new())
    }

    /// Drive at `speed` toward `heading` degrees
    fn roll(&self, speed: u8, heading: u16) -> impl Future<Output = Result<Response>> + Send {
        self.roll_with_state(speed, heading, ROLL_GO)
    }

    /// Roll with an explicit state byte, e.g. [`ROLL_STOP`] to brake
    fn roll_with_state(
        &self,
        speed: u8,
        heading: u16,
        state: u8,
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = Vec::with_capacity(4);
        payload.push(speed);
        put_int(&mut payload, heading.into(), 2);
        payload.push(state);
        self.command(ROLL, payload)
    }

    /// Start or stop a boost
    fn boost(&self, enabled: bool) -> impl Future<Output = Result<Response>> + Send {
        self.command(BOOST, vec![flag(enabled)])
    }

    /// Drive each motor directly; modes are off, forward, reverse, brake, ignore
    fn set_raw_motors(
        &self,
        left_mode: u8,
        left_power: u8,
        right_mode: u8,
        right_power: u8,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(
            SET_RAW_MOTORS,
            vec![left_mode, left_power, right_mode, right_power],
        )
    }

    /// Milliseconds before a roll command times out
    fn set_motion_timeout(&self, millis: u16) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_MOTION_TIMEOUT, u16_payload(millis))
    }

    /// Option flags that survive a power cycle
    fn set_permanent_option_flags(
        &self,
        flags: u32,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_PERM_OPTION_FLAGS, flags.to_be_bytes().to_vec())
    }

    /// Read the persistent option flags
    fn get_permanent_option_flags(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_PERM_OPTION_FLAGS, Vec::new())
    }

    /// Option flags that last until the robot sleeps
    fn set_temporary_option_flags(
        &self,
        flags: u32,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_TEMP_OPTION_FLAGS, flags.to_be_bytes().to_vec())
    }

    /// Read the temporary option flags
    fn get_temporary_option_flags(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_TEMP_OPTION_FLAGS, Vec::new())
    }

    /// Request a config block; contents arrive as an async event
    fn get_config_block(&self, id: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_CONFIG_BLOCK, vec![id])
    }

    /// Write the soul block parameters
    fn set_ssb_params(
        &self,
        password: u32,
        block: &[u8],
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_SSB_PARAMS, with_password(password, block))
    }

    /// Switch between normal and user hack mode
    fn set_device_mode(&self, mode: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_DEVICE_MODE, vec![mode])
    }

    /// Write a full config block
    fn set_config_block(&self, block: &[u8]) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_CONFIG_BLOCK, block.to_vec())
    }

    /// Current device mode
    fn get_device_mode(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_DEVICE_MODE, Vec::new())
    }

    /// Request the soul block; it arrives as an async event
    fn get_ssb(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_SSB, Vec::new())
    }

    /// Overwrite the soul block
    fn set_ssb(&self, password: u32, block: &[u8]) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_SSB, with_password(password, block))
    }

    /// Refill a consumable bank
    fn ssb_refill(&self, kind: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SSB_REFILL, vec![kind])
    }

    /// Buy `quantity` of a consumable
    fn ssb_buy(&self, item: u8, quantity: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SSB_BUY, vec![item, quantity])
    }

    /// Spend one consumable
    fn ssb_use_consumable(&self, item: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SSB_USE_CONSUMABLE, vec![item])
    }

    /// Credit cores to the soul block
    fn ssb_grant_cores(
        &self,
        password: u32,
        quantity: u32,
        flags: u8,
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = with_password(password, &quantity.to_be_bytes());
        payload.push(flags);
        self.command(SSB_GRANT_CORES, payload)
    }

    /// Add experience to the soul block
    fn ssb_add_xp(&self, password: u32, quantity: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(SSB_ADD_XP, with_password(password, &[quantity]))
    }

    /// Spend attribute points on `attribute`
    fn ssb_level_up_attr(
        &self,
        password: u32,
        attribute: u8,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SSB_LEVEL_UP_ATTR, with_password(password, &[attribute]))
    }

    /// Seed used to derive soul block passwords
    fn get_password_seed(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_PASSWORD_SEED, Vec::new())
    }

    /// Toggle async soul block notifications
    fn ssb_enable_async(&self, enabled: bool) -> impl Future<Output = Result<Response>> + Send {
        self.command(SSB_ENABLE_ASYNC, vec![flag(enabled)])
    }

    /// Run a stored macro
    fn run_macro(&self, id: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(RUN_MACRO, vec![id])
    }

    /// Store the temporary macro
    fn save_temp_macro(&self, body: &[u8]) -> impl Future<Output = Result<Response>> + Send {
        self.command(SAVE_TEMP_MACRO, body.to_vec())
    }

    /// Store a permanent macro
    fn save_macro(&self, body: &[u8]) -> impl Future<Output = Result<Response>> + Send {
        self.command(SAVE_MACRO, body.to_vec())
    }

    /// Stop and reset the macro executive
    fn init_macro_executive(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(INIT_MACRO_EXECUTIVE, Vec::new())
    }

    /// Abort the running macro
    fn abort_macro(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(ABORT_MACRO, Vec::new())
    }

    /// Running macro id and command number
    fn macro_status(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(MACRO_STATUS, Vec::new())
    }

    /// Set a macro parameter
    fn set_macro_param(
        &self,
        param: u8,
        first: u8,
        second: u8,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_MACRO_PARAM, vec![param, first, second])
    }

    /// Append to the temporary macro being assembled
    fn append_temp_macro_chunk(&self, chunk: &[u8]) -> impl Future<Output = Result<Response>> + Send {
        self.command(APPEND_TEMP_MACRO_CHUNK, chunk.to_vec())
    }

    /// Erase an orbBasic storage area
    fn erase_orb_basic_storage(&self, area: u8) -> impl Future<Output = Result<Response>> + Send {
        self.command(ERASE_ORB_BASIC_STORAGE, vec![area])
    }

    /// Append program text to an orbBasic area
    fn append_orb_basic_fragment(
        &self,
        area: u8,
        code: &[u8],
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = Vec::with_capacity(1 + code.len());
        payload.push(area);
        payload.extend_from_slice(code);
        self.command(APPEND_ORB_BASIC_FRAGMENT, payload)
    }

    /// Run the orbBasic program in `area` from `start_line`
    fn execute_orb_basic_program(
        &self,
        area: u8,
        start_line: u16,
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = vec![area];
        put_int(&mut payload, start_line.into(), 2);
        self.command(EXECUTE_ORB_BASIC_PROGRAM, payload)
    }

    /// Abort the running orbBasic program
    fn abort_orb_basic_program(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(ABORT_ORB_BASIC_PROGRAM, Vec::new())
    }

    /// Answer a pending orbBasic INPUT statement
    fn answer_input(&self, value: u32) -> impl Future<Output = Result<Response>> + Send {
        self.command(ANSWER_INPUT, value.to_be_bytes().to_vec())
    }

    /// Persist the RAM program to flash
    fn commit_to_flash(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(COMMIT_TO_FLASH, Vec::new())
    }
}

impl<T: Commander> RobotCommands for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Recorder;

    #[tokio::test]
    async fn test_roll_payload() {
        let robot = Recorder::default();
        robot.roll(255, 180).await.unwrap();

        let (opcode, payload) = robot.last();
        assert_eq!(opcode.device, 0x02);
        assert_eq!(opcode.command, 0x30);
        assert_eq!(payload, vec![0xFF, 0x00, 0xB4, 0x01]);

        robot.roll_with_state(0, 359, ROLL_STOP).await.unwrap();
        assert_eq!(robot.last().1, vec![0x00, 0x01, 0x67, 0x00]);
    }

    #[tokio::test]
    async fn test_set_data_streaming_records_mask() {
        let robot = Recorder::default();
        let config = StreamingConfig {
            divisor: 40,
            frames: 1,
            mask: StreamingMask::new(0x0007_0000, 0x0C00_0000),
            packet_count: 0,
        };
        robot.set_data_streaming(config).await.unwrap();

        assert_eq!(
            robot.last(),
            (
                SET_DATA_STREAMING,
                vec![
                    0x00, 0x28, // n
                    0x00, 0x01, // m
                    0x00, 0x07, 0x00, 0x00, // mask
                    0x00, // packet count
                    0x0C, 0x00, 0x00, 0x00, // mask2
                ]
            )
        );
        assert_eq!(robot.streaming_mask(), config.mask);
    }

    #[tokio::test]
    async fn test_collision_defaults() {
        let robot = Recorder::default();
        robot
            .configure_collisions(CollisionConfig::default())
            .await
            .unwrap();
        assert_eq!(
            robot.last(),
            (CONFIGURE_COLLISIONS, vec![0x01, 0x40, 0x50, 0x40, 0x50, 0x50])
        );
    }

    #[tokio::test]
    async fn test_signed_and_password_payloads() {
        let robot = Recorder::default();

        robot.configure_locator(0x01, -1, 256, 0).await.unwrap();
        assert_eq!(
            robot.last().1,
            vec![0x01, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00]
        );

        robot.ssb_grant_cores(0xA1B2_C3D4, 10, 0x02).await.unwrap();
        assert_eq!(
            robot.last().1,
            vec![0xA1, 0xB2, 0xC3, 0xD4, 0x00, 0x00, 0x00, 0x0A, 0x02]
        );

        robot.execute_orb_basic_program(0x01, 10).await.unwrap();
        assert_eq!(robot.last(), (EXECUTE_ORB_BASIC_PROGRAM, vec![0x01, 0x00, 0x0A]));
    }

    #[test]
    fn test_streaming_rate() {
        assert_eq!(StreamingConfig::at_rate(StreamingMask::ODOMETER, 5).divisor, 80);
        assert_eq!(StreamingConfig::at_rate(StreamingMask::ODOMETER, 0).divisor, 400);
        assert_eq!(StreamingConfig::at_rate(StreamingMask::ODOMETER, 1000).divisor, 1);
    }
}
