use crate::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Total length of one inbound logical frame.
pub const FRAME_LENGTH: usize = 300;
/// Length of an outgoing command frame.
pub const COMMAND_LENGTH: usize = 20;
/// Start sequence of inbound frames.
pub const FRAME_HEADER: [u8; 4] = [0x55, 0xAA, 0xEB, 0x90];
/// Start sequence of outgoing command frames (byte pairs reversed relative to
/// the inbound marker, per protocol).
pub const COMMAND_HEADER: [u8; 4] = [0xAA, 0x55, 0x90, 0xEB];
/// Notifications shorter than this are dropped before any state is touched.
pub const MIN_CHUNK_LENGTH: usize = 4;
/// A device info frame carries meaningful data in its first 134 bytes.
pub const DEVICE_INFO_LENGTH: usize = 134;

/// Offset of the frame type discriminator within an inbound frame.
pub const FRAME_TYPE_OFFSET: usize = 4;

const CELL_SLOTS: usize = 16;

/// Registers addressable through outgoing command frames.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Register {
    Settings = 0x01,
    ChargeSwitch = 0x1D,
    DischargeSwitch = 0x1E,
    BalanceSwitch = 0x1F,
    CellData = 0x96,
    DeviceInfo = 0x97,
}

/// Computes the 8-bit wraparound sum the device uses to sign command frames.
pub fn checksum(buffer: &[u8]) -> u8 {
    let mut checksum: u8 = 0;
    for b in buffer {
        checksum = checksum.wrapping_add(*b);
    }
    checksum
}

/// Builds a 20-byte command frame for the given register.
///
/// Layout: `AA 55 90 EB`, register, length, value (little-endian), zero
/// padding, trailing checksum over bytes 0-18.
pub fn write_register(register: Register, value: u32, length: u8) -> [u8; COMMAND_LENGTH] {
    let mut tx_buffer = [0; COMMAND_LENGTH];
    tx_buffer[0..4].copy_from_slice(&COMMAND_HEADER);
    tx_buffer[4] = register as u8;
    tx_buffer[5] = length;
    tx_buffer[6..10].copy_from_slice(&value.to_le_bytes());
    tx_buffer[COMMAND_LENGTH - 1] = checksum(&tx_buffer[..COMMAND_LENGTH - 1]);
    tx_buffer
}

fn validate_len(buffer: &[u8], required: usize) -> std::result::Result<(), Error> {
    if buffer.len() < required {
        log::warn!(
            "Invalid buffer size - required={} received={}",
            required,
            buffer.len()
        );
        return Err(Error::FrameTooShort {
            required,
            received: buffer.len(),
        });
    }
    Ok(())
}

/// Checks the trailing checksum byte of a complete inbound frame.
///
/// The device appends a running 8-bit sum as the final byte but the decode
/// path never rejects frames on a mismatch, mirroring the reference firmware
/// behavior. Callers wanting the extra integrity check can opt in.
pub fn validate_checksum(buffer: &[u8]) -> std::result::Result<(), Error> {
    validate_len(buffer, 2)?;
    let calculated = checksum(&buffer[..buffer.len() - 1]);
    let received = buffer[buffer.len() - 1];
    if calculated != received {
        log::warn!("Invalid checksum - calculated={calculated:02X?} received={received:02X?}");
        return Err(Error::CheckSum {
            calculated,
            received,
        });
    }
    Ok(())
}

fn read_u16_le(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}

fn read_i16_le(buffer: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}

fn read_u32_le(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

fn read_i32_le(buffer: &[u8], offset: usize) -> i32 {
    read_u32_le(buffer, offset) as i32
}

fn read_u24_le(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buffer[offset], buffer[offset + 1], buffer[offset + 2], 0])
}

/// Temperatures are 16-bit two's-complement values scaled by 0.1. Explicit
/// sign extension here means any high byte >= 0x80 reads negative, not just
/// the 0xFF the original firmware special-cased.
fn read_temperature(buffer: &[u8], offset: usize) -> f32 {
    read_i16_le(buffer, offset) as f32 / 10.0
}

fn read_text(buffer: &[u8], offset: usize, len: usize) -> String {
    String::from_utf8_lossy(&buffer[offset..offset + len])
        .trim_end_matches('\0')
        .to_string()
}

/// Frame type discriminator stored at byte 4 of every inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum FrameType {
    Settings = 0x01,
    CellData = 0x02,
    DeviceInfo = 0x03,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Error> {
        match value {
            0x01 => Ok(FrameType::Settings),
            0x02 => Ok(FrameType::CellData),
            0x03 => Ok(FrameType::DeviceInfo),
            other => Err(Error::UnknownFrameType(other)),
        }
    }
}

/// Uptime reported by the device, decomposed from a seconds counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Uptime {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Uptime {
    pub fn from_seconds(total: u32) -> Self {
        let mut value = total;
        let seconds = value % 60;
        value /= 60;
        let minutes = value % 60;
        value /= 60;
        let hours = value % 24;
        let days = value / 24;
        Self {
            days,
            hours,
            minutes,
            seconds,
        }
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}d {}h {}m {}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

// Byte offsets within a cell data frame. The layout is vendor-defined and
// observed from real devices; none of it is derivable.
mod cell_data_field {
    /// 16 consecutive u16 slots, one per cell.
    pub const CELL_VOLTAGES: usize = 6;
    pub const AVERAGE_CELL_VOLTAGE: usize = 74;
    pub const DELTA_CELL_VOLTAGE: usize = 76;
    /// 16 consecutive u16 slots, one per cell.
    pub const WIRE_RESISTANCES: usize = 80;
    pub const MOS_TEMPERATURE: usize = 144;
    pub const BATTERY_VOLTAGE: usize = 150;
    pub const CHARGE_CURRENT: usize = 158;
    pub const BATTERY_T1: usize = 162;
    pub const BATTERY_T2: usize = 164;
    pub const BALANCE_CURRENT: usize = 170;
    pub const BALANCING_ACTION: usize = 172;
    pub const SOC_PERCENT: usize = 173;
    pub const REMAINING_CAPACITY: usize = 174;
    pub const NOMINAL_CAPACITY: usize = 178;
    pub const CYCLE_COUNT: usize = 182;
    pub const CYCLE_CAPACITY: usize = 186;
    /// 24-bit seconds counter; byte 197 is not part of the field.
    pub const UPTIME: usize = 194;
    pub const CHARGING_FLAG: usize = 198;
    pub const DISCHARGING_FLAG: usize = 199;
    pub const BALANCING_FLAG: usize = 201;
}

/// Real-time telemetry decoded from a cell data frame (type 0x02).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellData {
    /// Per-cell voltages in volts. Slots after the last populated cell are
    /// trimmed; the hardware always transmits 16 slots and pads absent cells
    /// with zero.
    pub cell_voltages: Vec<f32>,
    /// Per-cell wire resistances in ohms, trimmed to the populated cell count.
    pub wire_resistances: Vec<f32>,
    pub average_cell_voltage: f32,
    pub delta_cell_voltage: f32,
    pub mos_temperature: f32,
    pub battery_voltage: f32,
    /// Pack current in amperes; negative while discharging.
    pub charge_current: f32,
    /// Derived as battery voltage times charge current, not read from the frame.
    pub battery_power: f32,
    pub battery_t1: f32,
    pub battery_t2: f32,
    /// Balancing current in amperes. `None` if the device reported a sign
    /// nibble outside the defined {0x0, 0xF} values.
    pub balance_current: Option<f32>,
    pub balancing_action: u8,
    pub soc_percent: u8,
    pub remaining_capacity: f32,
    pub nominal_capacity: f32,
    pub cycle_count: u32,
    pub cycle_capacity: f32,
    pub uptime: Uptime,
    pub charging: bool,
    pub discharging: bool,
    pub balancing: bool,
}

impl CellData {
    pub fn request() -> [u8; COMMAND_LENGTH] {
        write_register(Register::CellData, 0x00000000, 0x00)
    }

    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        use cell_data_field::*;

        validate_len(frame, FRAME_LENGTH)?;

        let mut cell_voltages = Vec::with_capacity(CELL_SLOTS);
        let mut wire_resistances = Vec::with_capacity(CELL_SLOTS);
        for slot in 0..CELL_SLOTS {
            cell_voltages.push(read_u16_le(frame, CELL_VOLTAGES + slot * 2) as f32 / 1000.0);
            wire_resistances.push(read_u16_le(frame, WIRE_RESISTANCES + slot * 2) as f32 / 1000.0);
        }
        // A zero tail means those cells do not exist, not that they read 0V.
        let populated = cell_voltages
            .iter()
            .rposition(|volt| *volt > 0.0)
            .map_or(0, |last| last + 1);
        cell_voltages.truncate(populated);
        wire_resistances.truncate(populated);

        let battery_voltage = read_u32_le(frame, BATTERY_VOLTAGE) as f32 / 1000.0;
        let charge_current = read_i32_le(frame, CHARGE_CURRENT) as f32 / 1000.0;

        let balance_current = match frame[BALANCE_CURRENT + 1] & 0xF0 {
            0x00 => Some(read_u16_le(frame, BALANCE_CURRENT) as f32 / 1000.0),
            0xF0 => {
                let magnitude =
                    ((frame[BALANCE_CURRENT + 1] & 0x0F) as u16) << 8 | frame[BALANCE_CURRENT] as u16;
                Some(-(magnitude as f32) / 1000.0)
            }
            nibble => {
                log::warn!(
                    "Undefined balance current sign nibble 0x{:X}, skipping field",
                    nibble >> 4
                );
                None
            }
        };

        Ok(Self {
            cell_voltages,
            wire_resistances,
            average_cell_voltage: read_u16_le(frame, AVERAGE_CELL_VOLTAGE) as f32 / 1000.0,
            delta_cell_voltage: read_u16_le(frame, DELTA_CELL_VOLTAGE) as f32 / 1000.0,
            mos_temperature: read_temperature(frame, MOS_TEMPERATURE),
            battery_voltage,
            charge_current,
            battery_power: battery_voltage * charge_current,
            battery_t1: read_temperature(frame, BATTERY_T1),
            battery_t2: read_temperature(frame, BATTERY_T2),
            balance_current,
            balancing_action: frame[BALANCING_ACTION],
            soc_percent: frame[SOC_PERCENT],
            remaining_capacity: read_u32_le(frame, REMAINING_CAPACITY) as f32 / 1000.0,
            nominal_capacity: read_u32_le(frame, NOMINAL_CAPACITY) as f32 / 1000.0,
            cycle_count: read_u32_le(frame, CYCLE_COUNT),
            cycle_capacity: read_u32_le(frame, CYCLE_CAPACITY) as f32 / 1000.0,
            uptime: Uptime::from_seconds(read_u24_le(frame, UPTIME)),
            charging: frame[CHARGING_FLAG] > 0,
            discharging: frame[DISCHARGING_FLAG] > 0,
            balancing: frame[BALANCING_FLAG] > 0,
        })
    }
}

// Byte offsets of the 32-bit fields within a settings frame, bytes 10-141.
// Verbatim vendor layout; the gaps hold fields this crate does not surface
// (e.g. the charge/discharge/balancer switch words at 118/122/126).
mod settings_field {
    pub const CELL_UNDERVOLTAGE_PROTECTION: usize = 10;
    pub const CELL_UNDERVOLTAGE_RECOVERY: usize = 14;
    pub const CELL_OVERVOLTAGE_PROTECTION: usize = 18;
    pub const CELL_OVERVOLTAGE_RECOVERY: usize = 22;
    pub const BALANCE_TRIGGER_VOLTAGE: usize = 26;
    pub const POWER_OFF_VOLTAGE: usize = 46;
    pub const MAX_CHARGE_CURRENT: usize = 50;
    pub const CHARGE_OVERCURRENT_DELAY: usize = 54;
    pub const CHARGE_OVERCURRENT_RECOVERY_TIME: usize = 58;
    pub const MAX_DISCHARGE_CURRENT: usize = 62;
    pub const DISCHARGE_OVERCURRENT_DELAY: usize = 66;
    pub const DISCHARGE_OVERCURRENT_RECOVERY_TIME: usize = 70;
    pub const SHORT_CIRCUIT_RECOVERY_TIME: usize = 74;
    pub const MAX_BALANCE_CURRENT: usize = 78;
    pub const CHARGE_OVERTEMPERATURE_PROTECTION: usize = 82;
    pub const CHARGE_OVERTEMPERATURE_RECOVERY: usize = 86;
    pub const DISCHARGE_OVERTEMPERATURE_PROTECTION: usize = 90;
    pub const DISCHARGE_OVERTEMPERATURE_RECOVERY: usize = 94;
    pub const CHARGE_UNDERTEMPERATURE_PROTECTION: usize = 98;
    pub const CHARGE_UNDERTEMPERATURE_RECOVERY: usize = 102;
    pub const MOS_OVERTEMPERATURE_PROTECTION: usize = 106;
    pub const MOS_OVERTEMPERATURE_RECOVERY: usize = 110;
    pub const CELL_COUNT: usize = 114;
    pub const TOTAL_CAPACITY: usize = 130;
    pub const SHORT_CIRCUIT_DELAY: usize = 134;
    pub const BALANCE_STARTING_VOLTAGE: usize = 138;
}

/// Protection thresholds and limits decoded from a settings frame (type 0x01).
///
/// Voltages and currents are scaled by 0.001, temperatures by 0.1; delays,
/// recovery times and counts are raw integers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    pub cell_undervoltage_protection: f32,
    pub cell_undervoltage_recovery: f32,
    pub cell_overvoltage_protection: f32,
    pub cell_overvoltage_recovery: f32,
    pub balance_trigger_voltage: f32,
    pub power_off_voltage: f32,
    pub max_charge_current: f32,
    pub charge_overcurrent_delay: u32,
    pub charge_overcurrent_recovery_time: u32,
    pub max_discharge_current: f32,
    pub discharge_overcurrent_delay: u32,
    pub discharge_overcurrent_recovery_time: u32,
    pub short_circuit_recovery_time: u32,
    pub max_balance_current: f32,
    pub charge_overtemperature_protection: f32,
    pub charge_overtemperature_recovery: f32,
    pub discharge_overtemperature_protection: f32,
    pub discharge_overtemperature_recovery: f32,
    pub charge_undertemperature_protection: f32,
    pub charge_undertemperature_recovery: f32,
    pub mos_overtemperature_protection: f32,
    pub mos_overtemperature_recovery: f32,
    pub cell_count: u32,
    pub total_capacity: f32,
    /// Short circuit protection delay in microseconds.
    pub short_circuit_delay: u32,
    pub balance_starting_voltage: f32,
}

impl Settings {
    pub fn request() -> [u8; COMMAND_LENGTH] {
        write_register(Register::Settings, 0x00000000, 0x00)
    }

    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        use settings_field::*;

        validate_len(frame, FRAME_LENGTH)?;

        // Temperature thresholds are signed; under-temperature limits sit
        // below zero on most packs.
        Ok(Self {
            cell_undervoltage_protection: read_u32_le(frame, CELL_UNDERVOLTAGE_PROTECTION) as f32
                / 1000.0,
            cell_undervoltage_recovery: read_u32_le(frame, CELL_UNDERVOLTAGE_RECOVERY) as f32
                / 1000.0,
            cell_overvoltage_protection: read_u32_le(frame, CELL_OVERVOLTAGE_PROTECTION) as f32
                / 1000.0,
            cell_overvoltage_recovery: read_u32_le(frame, CELL_OVERVOLTAGE_RECOVERY) as f32
                / 1000.0,
            balance_trigger_voltage: read_u32_le(frame, BALANCE_TRIGGER_VOLTAGE) as f32 / 1000.0,
            power_off_voltage: read_u32_le(frame, POWER_OFF_VOLTAGE) as f32 / 1000.0,
            max_charge_current: read_u32_le(frame, MAX_CHARGE_CURRENT) as f32 / 1000.0,
            charge_overcurrent_delay: read_u32_le(frame, CHARGE_OVERCURRENT_DELAY),
            charge_overcurrent_recovery_time: read_u32_le(frame, CHARGE_OVERCURRENT_RECOVERY_TIME),
            max_discharge_current: read_u32_le(frame, MAX_DISCHARGE_CURRENT) as f32 / 1000.0,
            discharge_overcurrent_delay: read_u32_le(frame, DISCHARGE_OVERCURRENT_DELAY),
            discharge_overcurrent_recovery_time: read_u32_le(
                frame,
                DISCHARGE_OVERCURRENT_RECOVERY_TIME,
            ),
            short_circuit_recovery_time: read_u32_le(frame, SHORT_CIRCUIT_RECOVERY_TIME),
            max_balance_current: read_u32_le(frame, MAX_BALANCE_CURRENT) as f32 / 1000.0,
            charge_overtemperature_protection: read_i32_le(frame, CHARGE_OVERTEMPERATURE_PROTECTION)
                as f32
                / 10.0,
            charge_overtemperature_recovery: read_i32_le(frame, CHARGE_OVERTEMPERATURE_RECOVERY)
                as f32
                / 10.0,
            discharge_overtemperature_protection: read_i32_le(
                frame,
                DISCHARGE_OVERTEMPERATURE_PROTECTION,
            ) as f32
                / 10.0,
            discharge_overtemperature_recovery: read_i32_le(
                frame,
                DISCHARGE_OVERTEMPERATURE_RECOVERY,
            ) as f32
                / 10.0,
            charge_undertemperature_protection: read_i32_le(
                frame,
                CHARGE_UNDERTEMPERATURE_PROTECTION,
            ) as f32
                / 10.0,
            charge_undertemperature_recovery: read_i32_le(frame, CHARGE_UNDERTEMPERATURE_RECOVERY)
                as f32
                / 10.0,
            mos_overtemperature_protection: read_i32_le(frame, MOS_OVERTEMPERATURE_PROTECTION)
                as f32
                / 10.0,
            mos_overtemperature_recovery: read_i32_le(frame, MOS_OVERTEMPERATURE_RECOVERY) as f32
                / 10.0,
            cell_count: read_u32_le(frame, CELL_COUNT),
            total_capacity: read_u32_le(frame, TOTAL_CAPACITY) as f32 / 1000.0,
            short_circuit_delay: read_u32_le(frame, SHORT_CIRCUIT_DELAY),
            balance_starting_voltage: read_u32_le(frame, BALANCE_STARTING_VOLTAGE) as f32 / 1000.0,
        })
    }
}

// Byte ranges of the device info fields as (offset, length) pairs.
mod device_info_field {
    pub const VENDOR_ID: (usize, usize) = (6, 16);
    pub const HARDWARE_VERSION: (usize, usize) = (22, 8);
    pub const SOFTWARE_VERSION: (usize, usize) = (30, 8);
    pub const UPTIME: usize = 38;
    pub const POWER_ON_COUNT: usize = 42;
    pub const DEVICE_NAME: (usize, usize) = (46, 16);
    pub const DEVICE_PASSCODE: (usize, usize) = (62, 16);
    pub const MANUFACTURING_DATE: (usize, usize) = (78, 8);
    pub const SERIAL_NUMBER: (usize, usize) = (86, 11);
    pub const PASSCODE: (usize, usize) = (97, 5);
    pub const USER_DATA: (usize, usize) = (102, 16);
    pub const SETUP_PASSCODE: (usize, usize) = (118, 16);
}

/// Device identity decoded from a device info frame (type 0x03).
///
/// Text fields are fixed-width on the wire; trailing NUL padding is trimmed,
/// everything before it is preserved verbatim.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    pub vendor_id: String,
    pub hardware_version: String,
    pub software_version: String,
    pub uptime_seconds: u32,
    pub power_on_count: u32,
    pub device_name: String,
    pub device_passcode: String,
    pub manufacturing_date: String,
    pub serial_number: String,
    pub passcode: String,
    pub user_data: String,
    pub setup_passcode: String,
}

impl DeviceInfo {
    pub fn request() -> [u8; COMMAND_LENGTH] {
        write_register(Register::DeviceInfo, 0x00000000, 0x00)
    }

    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        use device_info_field::*;

        validate_len(frame, DEVICE_INFO_LENGTH)?;

        Ok(Self {
            vendor_id: read_text(frame, VENDOR_ID.0, VENDOR_ID.1),
            hardware_version: read_text(frame, HARDWARE_VERSION.0, HARDWARE_VERSION.1),
            software_version: read_text(frame, SOFTWARE_VERSION.0, SOFTWARE_VERSION.1),
            uptime_seconds: read_u32_le(frame, UPTIME),
            power_on_count: read_u32_le(frame, POWER_ON_COUNT),
            device_name: read_text(frame, DEVICE_NAME.0, DEVICE_NAME.1),
            device_passcode: read_text(frame, DEVICE_PASSCODE.0, DEVICE_PASSCODE.1),
            manufacturing_date: read_text(frame, MANUFACTURING_DATE.0, MANUFACTURING_DATE.1),
            serial_number: read_text(frame, SERIAL_NUMBER.0, SERIAL_NUMBER.1),
            passcode: read_text(frame, PASSCODE.0, PASSCODE.1),
            user_data: read_text(frame, USER_DATA.0, USER_DATA.1),
            setup_passcode: read_text(frame, SETUP_PASSCODE.0, SETUP_PASSCODE.1),
        })
    }
}

pub struct SetChargeSwitch;

impl SetChargeSwitch {
    pub fn request(enable: bool) -> [u8; COMMAND_LENGTH] {
        write_register(Register::ChargeSwitch, enable as u32, 0x04)
    }
}

pub struct SetDischargeSwitch;

impl SetDischargeSwitch {
    pub fn request(enable: bool) -> [u8; COMMAND_LENGTH] {
        write_register(Register::DischargeSwitch, enable as u32, 0x04)
    }
}

pub struct SetBalanceSwitch;

impl SetBalanceSwitch {
    pub fn request(enable: bool) -> [u8; COMMAND_LENGTH] {
        write_register(Register::BalanceSwitch, enable as u32, 0x04)
    }
}

/// A decoded inbound frame, dispatched on the frame type discriminator.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Response {
    Settings(Settings),
    CellData(CellData),
    DeviceInfo(DeviceInfo),
}

impl Response {
    /// Decodes a complete frame into the record matching its type byte.
    pub fn decode(frame: &[u8]) -> std::result::Result<Self, Error> {
        validate_len(frame, FRAME_TYPE_OFFSET + 1)?;
        match FrameType::try_from(frame[FRAME_TYPE_OFFSET])? {
            FrameType::Settings => Settings::decode(frame).map(Response::Settings),
            FrameType::CellData => CellData::decode(frame).map(Response::CellData),
            FrameType::DeviceInfo => DeviceInfo::decode(frame).map(Response::DeviceInfo),
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Response::Settings(_) => FrameType::Settings,
            Response::CellData(_) => FrameType::CellData,
            Response::DeviceInfo(_) => FrameType::DeviceInfo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_frame(frame_type: u8) -> Vec<u8> {
        let mut frame = vec![0u8; FRAME_LENGTH];
        frame[..4].copy_from_slice(&FRAME_HEADER);
        frame[FRAME_TYPE_OFFSET] = frame_type;
        frame
    }

    #[test]
    fn checksum_is_deterministic() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A];
        assert_eq!(checksum(&data), checksum(&data));
    }

    #[test]
    fn checksum_of_zeros_is_zero() {
        assert_eq!(checksum(&[0u8; 19]), 0);
    }

    #[test]
    fn checksum_wraps_at_eight_bits() {
        let mut data = [0u8; 19];
        data[..5].copy_from_slice(&[0xAA, 0x55, 0x90, 0xEB, 0x97]);
        // (0xAA + 0x55 + 0x90 + 0xEB + 0x97) mod 256
        assert_eq!(checksum(&data), 0x11);
    }

    #[test]
    fn device_info_request_round_trip() {
        let frame = DeviceInfo::request();
        let mut expected = [0u8; COMMAND_LENGTH];
        expected[..6].copy_from_slice(&[0xAA, 0x55, 0x90, 0xEB, 0x97, 0x00]);
        expected[COMMAND_LENGTH - 1] = 0x11;
        assert_eq!(frame, expected);
    }

    #[test]
    fn switch_requests_carry_value_and_length() {
        let frame = SetChargeSwitch::request(true);
        assert_eq!(frame[4], 0x1D);
        assert_eq!(frame[5], 0x04);
        assert_eq!(&frame[6..10], &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(frame[19], checksum(&frame[..19]));

        let frame = SetDischargeSwitch::request(false);
        assert_eq!(frame[4], 0x1E);
        assert_eq!(&frame[6..10], &[0x00, 0x00, 0x00, 0x00]);

        let frame = SetBalanceSwitch::request(true);
        assert_eq!(frame[4], 0x1F);
    }

    #[test]
    fn cell_voltage_scaling() {
        let mut frame = empty_frame(0x02);
        frame[6] = 0x10;
        frame[7] = 0x0C;
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(cell_data.cell_voltages, vec![3.088]);
    }

    #[test]
    fn absent_cells_are_trimmed_not_zero_volts() {
        let mut frame = empty_frame(0x02);
        // 8 populated cells, slots 8-15 read zero
        for slot in 0..8 {
            frame[6 + slot * 2] = 0x10;
            frame[7 + slot * 2] = 0x0C;
            frame[80 + slot * 2] = 0x64;
        }
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(cell_data.cell_voltages.len(), 8);
        assert_eq!(cell_data.wire_resistances.len(), 8);
        assert_eq!(cell_data.wire_resistances[0], 0.1);
    }

    #[test]
    fn negative_temperature_sign_extension() {
        let mut frame = empty_frame(0x02);
        frame[144] = 0x38;
        frame[145] = 0xFF;
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(cell_data.mos_temperature, -20.0);
    }

    #[test]
    fn high_byte_below_ff_still_reads_negative() {
        // 0xFE38 = -456 as i16; the 0xFF-only comparison of the original
        // firmware would have read this as +6512.8
        let mut frame = empty_frame(0x02);
        frame[162] = 0x38;
        frame[163] = 0xFE;
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(cell_data.battery_t1, -45.6);
    }

    #[test]
    fn positive_temperature() {
        let mut frame = empty_frame(0x02);
        frame[164] = 0xFA;
        frame[165] = 0x00;
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(cell_data.battery_t2, 25.0);
    }

    #[test]
    fn balance_current_sign_split() {
        let mut frame = empty_frame(0x02);
        frame[170] = 0x64;
        frame[171] = 0x00;
        assert_eq!(
            CellData::decode(&frame).unwrap().balance_current,
            Some(0.100)
        );

        frame[171] = 0xF0;
        assert_eq!(
            CellData::decode(&frame).unwrap().balance_current,
            Some(-0.100)
        );
    }

    #[test]
    fn balance_current_undefined_nibble_is_skipped() {
        let mut frame = empty_frame(0x02);
        frame[170] = 0x64;
        frame[171] = 0x70;
        assert_eq!(CellData::decode(&frame).unwrap().balance_current, None);
    }

    #[test]
    fn charge_current_can_be_negative() {
        let mut frame = empty_frame(0x02);
        frame[150..154].copy_from_slice(&25600u32.to_le_bytes());
        frame[158..162].copy_from_slice(&(-5000i32).to_le_bytes());
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(cell_data.battery_voltage, 25.6);
        assert_eq!(cell_data.charge_current, -5.0);
        assert!((cell_data.battery_power - -128.0).abs() < 1e-3);
    }

    #[test]
    fn uptime_decomposition() {
        let uptime = Uptime::from_seconds(90065);
        assert_eq!(
            uptime,
            Uptime {
                days: 1,
                hours: 1,
                minutes: 1,
                seconds: 5
            }
        );
        assert_eq!(uptime.to_string(), "1d 1h 1m 5s");
    }

    #[test]
    fn uptime_is_a_24_bit_field() {
        let mut frame = empty_frame(0x02);
        frame[194..197].copy_from_slice(&[0xD1, 0x5F, 0x01]); // 90065
        frame[197] = 0xFF; // adjacent byte must not bleed in
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(
            cell_data.uptime,
            Uptime {
                days: 1,
                hours: 1,
                minutes: 1,
                seconds: 5
            }
        );
    }

    #[test]
    fn status_flags_are_independent() {
        let mut frame = empty_frame(0x02);
        frame[198] = 0x01;
        frame[199] = 0x00;
        frame[201] = 0x02;
        let cell_data = CellData::decode(&frame).unwrap();
        assert!(cell_data.charging);
        assert!(!cell_data.discharging);
        assert!(cell_data.balancing);
    }

    #[test]
    fn capacity_and_cycle_fields() {
        let mut frame = empty_frame(0x02);
        frame[173] = 67;
        frame[174..178].copy_from_slice(&70350u32.to_le_bytes());
        frame[178..182].copy_from_slice(&105000u32.to_le_bytes());
        frame[182..186].copy_from_slice(&42u32.to_le_bytes());
        frame[186..190].copy_from_slice(&4410000u32.to_le_bytes());
        let cell_data = CellData::decode(&frame).unwrap();
        assert_eq!(cell_data.soc_percent, 67);
        assert_eq!(cell_data.remaining_capacity, 70.35);
        assert_eq!(cell_data.nominal_capacity, 105.0);
        assert_eq!(cell_data.cycle_count, 42);
        assert_eq!(cell_data.cycle_capacity, 4410.0);
    }

    #[test]
    fn settings_offset_table() {
        let mut frame = empty_frame(0x01);
        frame[10..14].copy_from_slice(&2500u32.to_le_bytes());
        frame[18..22].copy_from_slice(&3650u32.to_le_bytes());
        frame[50..54].copy_from_slice(&100000u32.to_le_bytes());
        frame[54..58].copy_from_slice(&30u32.to_le_bytes());
        frame[98..102].copy_from_slice(&(-50i32).to_le_bytes());
        frame[114..118].copy_from_slice(&16u32.to_le_bytes());
        frame[130..134].copy_from_slice(&105000u32.to_le_bytes());
        frame[134..138].copy_from_slice(&250u32.to_le_bytes());
        frame[138..142].copy_from_slice(&3400u32.to_le_bytes());

        let settings = Settings::decode(&frame).unwrap();
        assert_eq!(settings.cell_undervoltage_protection, 2.5);
        assert_eq!(settings.cell_overvoltage_protection, 3.65);
        assert_eq!(settings.max_charge_current, 100.0);
        assert_eq!(settings.charge_overcurrent_delay, 30);
        assert_eq!(settings.charge_undertemperature_protection, -5.0);
        assert_eq!(settings.cell_count, 16);
        assert_eq!(settings.total_capacity, 105.0);
        assert_eq!(settings.short_circuit_delay, 250);
        assert_eq!(settings.balance_starting_voltage, 3.4);
    }

    #[test]
    fn device_info_text_fields() {
        let mut frame = empty_frame(0x03);
        frame[6..14].copy_from_slice(b"JK02_24S");
        frame[22..28].copy_from_slice(b"V11.XW");
        frame[30..35].copy_from_slice(b"V11.4");
        frame[38..42].copy_from_slice(&90065u32.to_le_bytes());
        frame[42..46].copy_from_slice(&7u32.to_le_bytes());
        frame[46..58].copy_from_slice(b"JK_B2A8S20P\0");
        frame[78..86].copy_from_slice(b"20230408");
        frame[86..96].copy_from_slice(b"2040891223");

        let info = DeviceInfo::decode(&frame).unwrap();
        assert_eq!(info.vendor_id, "JK02_24S");
        assert_eq!(info.hardware_version, "V11.XW");
        assert_eq!(info.software_version, "V11.4");
        assert_eq!(info.uptime_seconds, 90065);
        assert_eq!(info.power_on_count, 7);
        assert_eq!(info.device_name, "JK_B2A8S20P");
        assert_eq!(info.manufacturing_date, "20230408");
        assert_eq!(info.serial_number, "2040891223");
    }

    #[test]
    fn device_info_rejects_short_frame() {
        let frame = vec![0u8; DEVICE_INFO_LENGTH - 1];
        assert!(matches!(
            DeviceInfo::decode(&frame),
            Err(Error::FrameTooShort {
                required: DEVICE_INFO_LENGTH,
                ..
            })
        ));
    }

    #[test]
    fn dispatch_on_frame_type() {
        assert!(matches!(
            Response::decode(&empty_frame(0x01)),
            Ok(Response::Settings(_))
        ));
        assert!(matches!(
            Response::decode(&empty_frame(0x02)),
            Ok(Response::CellData(_))
        ));
        assert!(matches!(
            Response::decode(&empty_frame(0x03)),
            Ok(Response::DeviceInfo(_))
        ));
    }

    #[test]
    fn dispatch_rejects_unknown_frame_type() {
        assert!(matches!(
            Response::decode(&empty_frame(0x04)),
            Err(Error::UnknownFrameType(0x04))
        ));
    }

    #[test]
    fn inbound_checksum_is_opt_in() {
        let mut frame = empty_frame(0x02);
        // decode succeeds regardless of the trailing byte
        frame[FRAME_LENGTH - 1] = 0xAB;
        assert!(CellData::decode(&frame).is_ok());
        assert!(validate_checksum(&frame).is_err());

        frame[FRAME_LENGTH - 1] = checksum(&frame[..FRAME_LENGTH - 1]);
        assert!(validate_checksum(&frame).is_ok());
    }
}
