//! Core device (0x00): housekeeping, power and diagnostics.

use std::future::Future;

use super::{Commander, Response};
use crate::protocol::Result;
use crate::protocol::pack::{flag, put_int};

/// Virtual device id of the core table
pub const DEVICE: u8 = 0x00;

opcode_table! {
    DEVICE;
    PING = 0x01, "ping";
    VERSION = 0x02, "version";
    CONTROL_UART_TX = 0x03, "control_uart_tx";
    SET_DEVICE_NAME = 0x10, "set_device_name";
    GET_BLUETOOTH_INFO = 0x11, "get_bluetooth_info";
    SET_AUTO_RECONNECT = 0x12, "set_auto_reconnect";
    GET_AUTO_RECONNECT = 0x13, "get_auto_reconnect";
    GET_POWER_STATE = 0x20, "get_power_state";
    SET_POWER_NOTIFICATION = 0x21, "set_power_notification";
    SLEEP = 0x22, "sleep";
    GET_VOLTAGE_TRIP_POINTS = 0x23, "get_voltage_trip_points";
    SET_VOLTAGE_TRIP_POINTS = 0x24, "set_voltage_trip_points";
    SET_INACTIVITY_TIMEOUT = 0x25, "set_inactivity_timeout";
    JUMP_TO_BOOTLOADER = 0x30, "jump_to_bootloader";
    RUN_L1_DIAGS = 0x40, "run_l1_diags";
    RUN_L2_DIAGS = 0x41, "run_l2_diags";
    CLEAR_COUNTERS = 0x42, "clear_counters";
    ASSIGN_TIME = 0x50, "assign_time";
    POLL_PACKET_TIMES = 0x51, "poll_packet_times";
}

/// Core device commands
pub trait CoreCommands: Commander {
    /// Check the link is alive
    fn ping(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(PING, Vec::new())
    }

    /// Firmware and hardware versions
    fn version(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(VERSION, Vec::new())
    }

    /// Enable or disable the UART transmit line
    fn control_uart_tx(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(CONTROL_UART_TX, Vec::new())
    }

    /// Set the advertised Bluetooth name
    fn set_device_name(&self, name: &str) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_DEVICE_NAME, name.as_bytes().to_vec())
    }

    /// Name, address and ID colors
    fn get_bluetooth_info(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_BLUETOOTH_INFO, Vec::new())
    }

    /// Configure auto reconnect after `seconds`
    fn set_auto_reconnect(
        &self,
        enabled: bool,
        seconds: u8,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_AUTO_RECONNECT, vec![flag(enabled), seconds])
    }

    /// Current auto reconnect setting
    fn get_auto_reconnect(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_AUTO_RECONNECT, Vec::new())
    }

    /// Battery state, voltage and charge counters
    fn get_power_state(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_POWER_STATE, Vec::new())
    }

    /// Toggle async battery state events
    fn set_power_notification(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<Response>> + Send {
        self.command(SET_POWER_NOTIFICATION, vec![flag(enabled)])
    }

    /// Sleep, then wake after `wakeup` seconds running a macro or orbBasic line
    fn sleep(
        &self,
        wakeup: u16,
        macro_id: u8,
        orb_basic_line: u16,
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = Vec::with_capacity(5);
        put_int(&mut payload, wakeup.into(), 2);
        payload.push(macro_id);
        put_int(&mut payload, orb_basic_line.into(), 2);
        self.command(SLEEP, payload)
    }

    /// Low and critical battery thresholds
    fn get_voltage_trip_points(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(GET_VOLTAGE_TRIP_POINTS, Vec::new())
    }

    /// Voltages are in hundredths of a volt
    fn set_voltage_trip_points(
        &self,
        low: u16,
        critical: u16,
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = Vec::with_capacity(4);
        put_int(&mut payload, low.into(), 2);
        put_int(&mut payload, critical.into(), 2);
        self.command(SET_VOLTAGE_TRIP_POINTS, payload)
    }

    /// Seconds of inactivity before the robot sleeps
    fn set_inactivity_timeout(
        &self,
        seconds: u16,
    ) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = Vec::with_capacity(2);
        put_int(&mut payload, seconds.into(), 2);
        self.command(SET_INACTIVITY_TIMEOUT, payload)
    }

    /// Leave the main application for the bootloader
    fn jump_to_bootloader(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(JUMP_TO_BOOTLOADER, Vec::new())
    }

    /// Level 1 diagnostics; the report arrives as an async event
    fn run_l1_diags(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(RUN_L1_DIAGS, Vec::new())
    }

    /// Level 2 diagnostics counters
    fn run_l2_diags(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(RUN_L2_DIAGS, Vec::new())
    }

    /// Reset the level 2 diagnostics counters
    fn clear_counters(&self) -> impl Future<Output = Result<Response>> + Send {
        self.command(CLEAR_COUNTERS, Vec::new())
    }

    /// Set the robot's internal clock
    fn assign_time(&self, time: u32) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = Vec::with_capacity(4);
        put_int(&mut payload, time.into(), 4);
        self.command(ASSIGN_TIME, payload)
    }

    /// Round-trip timing; `time` is echoed back with the robot's timestamps
    fn poll_packet_times(&self, time: u32) -> impl Future<Output = Result<Response>> + Send {
        let mut payload = Vec::with_capacity(4);
        put_int(&mut payload, time.into(), 4);
        self.command(POLL_PACKET_TIMES, payload)
    }
}

impl<T: Commander> CoreCommands for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Recorder;

    #[tokio::test]
    async fn test_core_payloads() {
        let robot = Recorder::default();

        robot.ping().await.unwrap();
        assert_eq!(robot.last(), (PING, vec![]));

        robot.set_auto_reconnect(true, 7).await.unwrap();
        assert_eq!(robot.last(), (SET_AUTO_RECONNECT, vec![0x01, 0x07]));

        robot.sleep(300, 2, 10).await.unwrap();
        assert_eq!(robot.last(), (SLEEP, vec![0x01, 0x2C, 0x02, 0x00, 0x0A]));

        robot.set_voltage_trip_points(700, 650).await.unwrap();
        assert_eq!(
            robot.last(),
            (SET_VOLTAGE_TRIP_POINTS, vec![0x02, 0xBC, 0x02, 0x8A])
        );

        robot.poll_packet_times(0x0102_0304).await.unwrap();
        assert_eq!(robot.last(), (POLL_PACKET_TIMES, vec![1, 2, 3, 4]));

        robot.set_device_name("Orb").await.unwrap();
        assert_eq!(robot.last(), (SET_DEVICE_NAME, b"Orb".to_vec()));

        assert_eq!(robot.count(), 6);
    }
}
