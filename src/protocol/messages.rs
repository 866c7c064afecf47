//! Typed VE.Bus messages
//!
//! Decoders from validated frames into the structures consumers read, and
//! builders for every outbound command. Field offsets and scale factors
//! follow the device's register layout; all multi-byte status values are
//! little-endian except where noted.

use serde::Serialize;

use super::constants::*;
use super::frame::Frame;

/// Inverter/charger operating state reported in the DC info status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceStatus {
    Off = 0,
    LowPower = 1,
    Fault = 2,
    Bulk = 3,
    Absorption = 4,
    Float = 5,
    Storage = 6,
    Equalize = 7,
    Passthru = 8,
    Inverting = 9,
    PowerAssist = 10,
    PowerSupply = 11,
}

impl DeviceStatus {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Off),
            1 => Some(Self::LowPower),
            2 => Some(Self::Fault),
            3 => Some(Self::Bulk),
            4 => Some(Self::Absorption),
            5 => Some(Self::Float),
            6 => Some(Self::Storage),
            7 => Some(Self::Equalize),
            8 => Some(Self::Passthru),
            9 => Some(Self::Inverting),
            10 => Some(Self::PowerAssist),
            11 => Some(Self::PowerSupply),
            _ => None,
        }
    }
}

/// Main switch position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchState {
    ChargerOnly = 1,
    InverterOnly = 2,
    On = 3,
    Off = 4,
}

impl SwitchState {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::ChargerOnly),
            2 => Some(Self::InverterOnly),
            3 => Some(Self::On),
            4 => Some(Self::Off),
            _ => None,
        }
    }
}

/// DC rail snapshot (command 0x02)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DcInfo {
    /// Battery voltage in V
    pub voltage: f32,
    /// Battery current in A; negative while discharging
    pub current: f32,
    /// Remaining battery capacity in Ah
    pub battery_ah: f32,
    /// Raw device status byte (see [`DeviceStatus`])
    pub status: u8,
    /// Active error code, 0 when none
    pub error_code: u8,
}

impl DcInfo {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_DC_INFO || frame.payload.len() < 8 {
            return None;
        }
        let d = &frame.payload;
        let mut current = u16::from_le_bytes([d[2], d[3]]) as f32 / 10.0;
        if d[3] & 0x80 != 0 {
            current = -current;
        }
        Some(Self {
            voltage: u16::from_le_bytes([d[0], d[1]]) as f32 / 100.0,
            current,
            battery_ah: u16::from_le_bytes([d[4], d[5]]) as f32 / 10.0,
            status: d[6],
            error_code: d[7],
        })
    }
}

/// AC rail snapshot (command 0x03)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AcInfo {
    /// Mains voltage in V
    pub voltage: f32,
    /// Mains current in A
    pub current: f32,
    /// Mains frequency in Hz
    pub frequency: f32,
    /// Active power in W
    pub power: i16,
    /// Power factor, 0.0..=1.0
    pub power_factor: f32,
    /// AC status flag byte
    pub status: u8,
}

impl AcInfo {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_AC_INFO || frame.payload.len() < 12 {
            return None;
        }
        let d = &frame.payload;
        Some(Self {
            voltage: u16::from_le_bytes([d[0], d[1]]) as f32 / 100.0,
            current: u16::from_le_bytes([d[2], d[3]]) as f32 / 100.0,
            frequency: u16::from_le_bytes([d[4], d[5]]) as f32 / 100.0,
            power: i16::from_le_bytes([d[6], d[7]]),
            power_factor: d[8] as f32 / 100.0,
            status: d[9],
        })
    }
}

/// Front-panel LED and switch registers (command 0x04)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LedState {
    pub led_register: u8,
    pub switch_register: u8,
    pub led_on: bool,
    pub led_blink: bool,
    /// Actual input current limit in A
    pub input_current_limit: f32,
    pub input_config: u8,
}

impl LedState {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_LED_STATUS || frame.payload.len() < 6 {
            return None;
        }
        let d = &frame.payload;
        Some(Self {
            led_register: d[0],
            switch_register: d[1],
            led_on: d[2] & 0x01 != 0,
            led_blink: d[2] & 0x02 != 0,
            input_current_limit: d[3] as f32 / 10.0,
            input_config: d[4],
        })
    }
}

/// Per-LED detail from the extended LED query (facade only)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LedDetail {
    pub main: u8,
    pub absorption: u8,
    pub bulk: u8,
    pub float: u8,
    pub inverter: u8,
    pub overload: u8,
    pub low_battery: u8,
    pub temperature: u8,
}

impl LedDetail {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_LED_STATUS || frame.payload.len() < 8 {
            return None;
        }
        let d = &frame.payload;
        Some(Self {
            main: d[0],
            absorption: d[1],
            bulk: d[2],
            float: d[3],
            inverter: d[4],
            overload: d[5],
            low_battery: d[6],
            temperature: d[7],
        })
    }
}

/// Version reply (command 0x01)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub product_id: u8,
    pub firmware_version: u8,
    pub protocol_version: u8,
}

impl VersionInfo {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_GET_VERSION || frame.payload.len() < 3 {
            return None;
        }
        Some(Self {
            product_id: frame.payload[0],
            firmware_version: frame.payload[1],
            protocol_version: frame.payload[2],
        })
    }
}

/// Device status reply (command 0x06)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStatusInfo {
    pub state: u8,
    pub mode: u8,
    pub alarm: u8,
    pub warnings: u8,
}

impl DeviceStatusInfo {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_GET_DEVICE_STATUS || frame.payload.len() < 4 {
            return None;
        }
        Some(Self {
            state: frame.payload[0],
            mode: frame.payload[1],
            alarm: frame.payload[2],
            warnings: frame.payload[3],
        })
    }
}

/// Error report reply (command 0x50); counters are big-endian
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub error_code: u8,
    pub error_sub_code: u8,
    pub error_counter: u32,
    pub timestamp: u32,
}

impl ErrorInfo {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_GET_ERROR_INFO || frame.payload.len() < 10 {
            return None;
        }
        let d = &frame.payload;
        Some(Self {
            error_code: d[0],
            error_sub_code: d[1],
            error_counter: u32::from_be_bytes([d[2], d[3], d[4], d[5]]),
            timestamp: u32::from_be_bytes([d[6], d[7], d[8], d[9]]),
        })
    }
}

/// Warning report reply (command 0x51)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarningInfo {
    pub warning_flags: u16,
    pub battery_voltage_warning: u8,
    pub temperature_warning: u8,
    pub overload_warning: u8,
    pub dc_ripple_warning: u8,
}

impl WarningInfo {
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.command != CMD_GET_WARNING_INFO || frame.payload.len() < 6 {
            return None;
        }
        let d = &frame.payload;
        Some(Self {
            warning_flags: u16::from_be_bytes([d[0], d[1]]),
            battery_voltage_warning: d[2],
            temperature_warning: d[3],
            overload_warning: d[4],
            dc_ripple_warning: d[5],
        })
    }
}

/// Outbound command frame builders
///
/// Set commands carry a wrapping command id byte allocated by the engine;
/// query requests carry a single zero selector byte.
pub struct VeBusCodec;

impl VeBusCodec {
    /// ESS power setpoint in W; positive charges the battery, negative
    /// discharges it
    pub fn ess_power(watts: i16, command_id: u8) -> Frame {
        let [lo, hi] = watts.to_le_bytes();
        Frame::simple(BROADCAST_ADDRESS, CMD_SET_ESS_POWER, vec![lo, hi, command_id])
    }

    /// AC input current limit in A
    pub fn input_current_limit(amps: u8, command_id: u8) -> Frame {
        Frame::simple(
            BROADCAST_ADDRESS,
            CMD_SET_INPUT_CURRENT,
            vec![amps, command_id],
        )
    }

    /// Main switch position
    pub fn switch_state(state: SwitchState, command_id: u8) -> Frame {
        Frame::simple(
            BROADCAST_ADDRESS,
            CMD_SET_SWITCH,
            vec![state as u8, command_id],
        )
    }

    pub fn device_reset() -> Frame {
        Frame::simple(BROADCAST_ADDRESS, CMD_DEVICE_RESET, vec![0x00, 0x01])
    }

    pub fn clear_errors() -> Frame {
        Frame::simple(BROADCAST_ADDRESS, CMD_CLEAR_ERRORS, vec![0x00, 0x01])
    }

    pub fn auto_restart(enable: bool) -> Frame {
        Frame::simple(
            BROADCAST_ADDRESS,
            CMD_SET_AUTO_RESTART,
            vec![0x00, u8::from(enable)],
        )
    }

    /// Accepted AC voltage window in V; encoded big-endian at 10 mV steps
    pub fn voltage_range(min_volts: f32, max_volts: f32) -> Frame {
        let min = (min_volts * 100.0) as u16;
        let max = (max_volts * 100.0) as u16;
        let mut payload = vec![0x00];
        payload.extend_from_slice(&min.to_be_bytes());
        payload.extend_from_slice(&max.to_be_bytes());
        Frame::simple(BROADCAST_ADDRESS, CMD_SET_VOLTAGE_RANGE, payload)
    }

    /// Accepted AC frequency window in Hz; encoded big-endian at 10 mHz steps
    pub fn frequency_range(min_hz: f32, max_hz: f32) -> Frame {
        let min = (min_hz * 100.0) as u16;
        let max = (max_hz * 100.0) as u16;
        let mut payload = vec![0x00];
        payload.extend_from_slice(&min.to_be_bytes());
        payload.extend_from_slice(&max.to_be_bytes());
        Frame::simple(BROADCAST_ADDRESS, CMD_SET_FREQUENCY_RANGE, payload)
    }

    pub fn version_request() -> Frame {
        Frame::simple(BROADCAST_ADDRESS, CMD_GET_VERSION, vec![0x00])
    }

    pub fn device_status_request() -> Frame {
        Frame::simple(BROADCAST_ADDRESS, CMD_GET_DEVICE_STATUS, vec![0x00])
    }

    pub fn error_info_request() -> Frame {
        Frame::simple(BROADCAST_ADDRESS, CMD_GET_ERROR_INFO, vec![0x00])
    }

    pub fn warning_info_request() -> Frame {
        Frame::simple(BROADCAST_ADDRESS, CMD_GET_WARNING_INFO, vec![0x00])
    }

    pub fn led_status_request() -> Frame {
        Frame::simple(BROADCAST_ADDRESS, CMD_LED_STATUS, vec![0x00])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_info_decode() {
        // 48.00 V, 12.5 A charging, 100.0 Ah, bulk, no error
        let payload = vec![0xC0, 0x12, 0x7D, 0x00, 0xE8, 0x03, 0x03, 0x00];
        let frame = Frame::simple(0x00, CMD_DC_INFO, payload);
        let dc = DcInfo::from_frame(&frame).unwrap();
        assert!((dc.voltage - 48.0).abs() < 0.001);
        assert!((dc.current - 12.5).abs() < 0.001);
        assert!((dc.battery_ah - 100.0).abs() < 0.001);
        assert_eq!(dc.status, 0x03);
        assert_eq!(DeviceStatus::from_raw(dc.status), Some(DeviceStatus::Bulk));
        assert_eq!(dc.error_code, 0);
    }

    #[test]
    fn test_dc_info_discharge_sign() {
        let payload = vec![0x00, 0x00, 0x7D, 0x80, 0x00, 0x00, 0x09, 0x00];
        let frame = Frame::simple(0x00, CMD_DC_INFO, payload);
        let dc = DcInfo::from_frame(&frame).unwrap();
        assert!(dc.current < 0.0);
    }

    #[test]
    fn test_dc_info_rejects_short_payload() {
        let frame = Frame::simple(0x00, CMD_DC_INFO, vec![0x01, 0x02]);
        assert!(DcInfo::from_frame(&frame).is_none());
        let frame = Frame::simple(0x00, CMD_AC_INFO, vec![0u8; 8]);
        assert!(DcInfo::from_frame(&frame).is_none());
    }

    #[test]
    fn test_ac_info_decode() {
        // 230.00 V, 4.35 A, 50.02 Hz, -800 W, pf 0.99
        let mut payload = Vec::new();
        payload.extend_from_slice(&23000u16.to_le_bytes());
        payload.extend_from_slice(&435u16.to_le_bytes());
        payload.extend_from_slice(&5002u16.to_le_bytes());
        payload.extend_from_slice(&(-800i16).to_le_bytes());
        payload.push(99);
        payload.push(0x01);
        payload.extend_from_slice(&[0x00, 0x00]);
        let frame = Frame::simple(0x00, CMD_AC_INFO, payload);
        let ac = AcInfo::from_frame(&frame).unwrap();
        assert!((ac.voltage - 230.0).abs() < 0.001);
        assert!((ac.current - 4.35).abs() < 0.001);
        assert!((ac.frequency - 50.02).abs() < 0.001);
        assert_eq!(ac.power, -800);
        assert!((ac.power_factor - 0.99).abs() < 0.001);
        assert_eq!(ac.status, 0x01);
    }

    #[test]
    fn test_led_state_decode() {
        let frame = Frame::simple(0x00, CMD_LED_STATUS, vec![0x05, 0x03, 0x03, 160, 0x02, 0x00]);
        let led = LedState::from_frame(&frame).unwrap();
        assert_eq!(led.led_register, 0x05);
        assert_eq!(led.switch_register, 0x03);
        assert!(led.led_on);
        assert!(led.led_blink);
        assert!((led.input_current_limit - 16.0).abs() < 0.001);
        assert_eq!(led.input_config, 0x02);
    }

    #[test]
    fn test_version_info_decode() {
        let frame = Frame::simple(0x00, CMD_GET_VERSION, vec![0x12, 0x34, 0x02]);
        let version = VersionInfo::from_frame(&frame).unwrap();
        assert_eq!(version.product_id, 0x12);
        assert_eq!(version.firmware_version, 0x34);
        assert_eq!(version.protocol_version, 0x02);
    }

    #[test]
    fn test_error_info_decode_big_endian_counters() {
        let mut payload = vec![0x11, 0x02];
        payload.extend_from_slice(&7u32.to_be_bytes());
        payload.extend_from_slice(&123456u32.to_be_bytes());
        let frame = Frame::simple(0x00, CMD_GET_ERROR_INFO, payload);
        let error = ErrorInfo::from_frame(&frame).unwrap();
        assert_eq!(error.error_code, 0x11);
        assert_eq!(error.error_sub_code, 0x02);
        assert_eq!(error.error_counter, 7);
        assert_eq!(error.timestamp, 123456);
    }

    #[test]
    fn test_warning_info_decode() {
        let frame = Frame::simple(
            0x00,
            CMD_GET_WARNING_INFO,
            vec![0x01, 0x80, 0x01, 0x00, 0x02, 0x00],
        );
        let warning = WarningInfo::from_frame(&frame).unwrap();
        assert_eq!(warning.warning_flags, 0x0180);
        assert_eq!(warning.battery_voltage_warning, 0x01);
        assert_eq!(warning.overload_warning, 0x02);
    }

    #[test]
    fn test_ess_power_command_layout() {
        let frame = VeBusCodec::ess_power(-1500, 7);
        assert_eq!(frame.command, CMD_SET_ESS_POWER);
        assert_eq!(frame.address, BROADCAST_ADDRESS);
        let [lo, hi] = (-1500i16).to_le_bytes();
        assert_eq!(frame.payload, vec![lo, hi, 7]);
    }

    #[test]
    fn test_switch_command_layout() {
        let frame = VeBusCodec::switch_state(SwitchState::ChargerOnly, 2);
        assert_eq!(frame.command, CMD_SET_SWITCH);
        assert_eq!(frame.payload, vec![0x01, 0x02]);
    }

    #[test]
    fn test_voltage_range_scaling() {
        let frame = VeBusCodec::voltage_range(180.0, 265.0);
        assert_eq!(frame.command, CMD_SET_VOLTAGE_RANGE);
        assert_eq!(frame.payload[0], 0x00);
        assert_eq!(&frame.payload[1..3], &18000u16.to_be_bytes());
        assert_eq!(&frame.payload[3..5], &26500u16.to_be_bytes());
    }

    #[test]
    fn test_requests_use_zero_selector() {
        for frame in [
            VeBusCodec::version_request(),
            VeBusCodec::device_status_request(),
            VeBusCodec::error_info_request(),
            VeBusCodec::warning_info_request(),
            VeBusCodec::led_status_request(),
        ] {
            assert_eq!(frame.payload, vec![0x00]);
        }
    }

    #[test]
    fn test_switch_state_from_raw() {
        assert_eq!(SwitchState::from_raw(3), Some(SwitchState::On));
        assert_eq!(SwitchState::from_raw(0), None);
        assert_eq!(SwitchState::from_raw(5), None);
    }
}
