//! VE.Bus protocol constants
//!
//! Wire markers, command opcodes and size limits shared by the frame model
//! and the assembler.

/// Maximum raw frame size buffered by the assembler
pub const MAX_FRAME_SIZE: usize = 128;

/// Maximum payload length carried by a frame
pub const MAX_PAYLOAD_SIZE: usize = 120;

/// Simple-variant sync byte
pub const SYNC_BYTE: u8 = 0xFF;

/// Simple-variant frame overhead: sync + address + command + length
pub const SIMPLE_HEADER_SIZE: usize = 4;

/// Extended-variant header bytes
pub const EXT_HEADER1: u8 = 0x98;
pub const EXT_HEADER2: u8 = 0xF7;

/// Extended-variant data frame type
pub const EXT_FRAME_TYPE_DATA: u8 = 0xFE;

/// Extended-variant end-of-frame marker; never appears unescaped inside the
/// stuffed region
pub const EXT_END_MARKER: u8 = 0xFF;

/// Escape marker introducing a stuffed byte pair
pub const STUFF_MARKER: u8 = 0xFA;

/// Lowest data byte value that must be stuffed
pub const STUFF_THRESHOLD: u8 = 0xFA;

/// Lowest checksum value that must be stuffed (one above the data
/// threshold: an unstuffed checksum of exactly 0xFA is unambiguous because
/// nothing follows it inside the stuffed region)
pub const CHECKSUM_STUFF_THRESHOLD: u8 = 0xFB;

/// Minimum extended frame: header(2) + frame type + sequence + address +
/// command + checksum + end marker
pub const MIN_EXTENDED_FRAME: usize = 8;

/// Minimum simple frame: header(4) + checksum
pub const MIN_SIMPLE_FRAME: usize = 5;

/// Broadcast device address
pub const BROADCAST_ADDRESS: u8 = 0x00;

// Command opcodes
pub const CMD_GET_VERSION: u8 = 0x01;
pub const CMD_DC_INFO: u8 = 0x02;
pub const CMD_AC_INFO: u8 = 0x03;
pub const CMD_LED_STATUS: u8 = 0x04;
pub const CMD_SET_SWITCH: u8 = 0x05;
pub const CMD_GET_DEVICE_STATUS: u8 = 0x06;
pub const CMD_SET_ESS_POWER: u8 = 0x37;
pub const CMD_SET_CHARGE_CURRENT: u8 = 0x40;
pub const CMD_SET_INPUT_CURRENT: u8 = 0x41;
pub const CMD_GET_STATUS: u8 = 0x42;
pub const CMD_GET_ERROR_INFO: u8 = 0x50;
pub const CMD_GET_WARNING_INFO: u8 = 0x51;
pub const CMD_DEVICE_RESET: u8 = 0x52;
pub const CMD_CLEAR_ERRORS: u8 = 0x53;
pub const CMD_SET_AUTO_RESTART: u8 = 0x54;
pub const CMD_SET_VOLTAGE_RANGE: u8 = 0x55;
pub const CMD_SET_FREQUENCY_RANGE: u8 = 0x56;
