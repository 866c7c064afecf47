//! VE.Bus frame model
//!
//! Two wire-format variants share one logical frame type:
//!
//! - Simple: `sync(0xFF) addr cmd len payload checksum` where
//!   `checksum = 0x55 - (addr + cmd + len + payload bytes)` mod 256.
//!   No byte stuffing.
//! - Extended: `0x98 0xF7 frame_type seq stuff(addr, cmd, payload)
//!   checksum 0xFF`. Data bytes >= 0xFA are stuffed as
//!   `0xFA, 0x70 | (b & 0x0F)`. The checksum starts at 1 and subtracts
//!   every stuffed-stream byte from the frame-type offset onward; it is
//!   itself stuffed when >= 0xFB.
//!
//! Encode and decode operate on byte slices with explicit bounds checks.
//! A decoded frame has always passed checksum validation.

use serde::Serialize;

use super::constants::*;
use crate::error::{Result, VeBusError};

/// Wire-format variant, selecting checksum and stuffing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameVariant {
    /// Length-delimited format, additive checksum, no stuffing
    Simple,
    /// Terminator-delimited format with byte stuffing
    Extended,
}

/// One logical VE.Bus protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub variant: FrameVariant,
    /// Target/source device id; 0 is broadcast
    pub address: u8,
    /// Message opcode
    pub command: u8,
    /// Frame counter; meaningful only for the extended variant, wraps at 256
    pub sequence: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a simple-variant frame
    pub fn simple(address: u8, command: u8, payload: Vec<u8>) -> Self {
        Self {
            variant: FrameVariant::Simple,
            address,
            command,
            sequence: 0,
            payload,
        }
    }

    /// Build an extended-variant frame
    pub fn extended(address: u8, command: u8, sequence: u8, payload: Vec<u8>) -> Self {
        Self {
            variant: FrameVariant::Extended,
            address,
            command,
            sequence,
            payload,
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(VeBusError::frame(format!(
                "payload too large: {} bytes (max {})",
                self.payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        match self.variant {
            FrameVariant::Simple => Ok(self.encode_simple()),
            FrameVariant::Extended => Ok(self.encode_extended()),
        }
    }

    fn encode_simple(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIMPLE_HEADER_SIZE + self.payload.len() + 1);
        out.push(SYNC_BYTE);
        out.push(self.address);
        out.push(self.command);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        out.push(simple_checksum(
            self.address,
            self.command,
            self.payload.len() as u8,
            &self.payload,
        ));
        out
    }

    fn encode_extended(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_EXTENDED_FRAME + self.payload.len() * 2);
        out.push(EXT_HEADER1);
        out.push(EXT_HEADER2);
        out.push(EXT_FRAME_TYPE_DATA);
        out.push(self.sequence);

        stuff_byte(&mut out, self.address);
        stuff_byte(&mut out, self.command);
        for &b in &self.payload {
            stuff_byte(&mut out, b);
        }

        // Checksum over the stuffed stream from the frame-type byte
        let mut cs: u8 = 1;
        for &b in &out[2..] {
            cs = cs.wrapping_sub(b);
        }
        if cs >= CHECKSUM_STUFF_THRESHOLD {
            out.push(STUFF_MARKER);
            out.push(0x70 | (cs & 0x0F));
        } else {
            out.push(cs);
        }
        out.push(EXT_END_MARKER);
        out
    }

    /// Decode a complete raw frame, selecting the variant by its leading byte
    pub fn decode(raw: &[u8]) -> Result<Frame> {
        match raw.first() {
            Some(&SYNC_BYTE) => Self::decode_simple(raw),
            Some(&EXT_HEADER1) => Self::decode_extended(raw),
            Some(&b) => Err(VeBusError::frame(format!(
                "unrecognized frame start byte 0x{b:02X}"
            ))),
            None => Err(VeBusError::frame("empty buffer")),
        }
    }

    /// Decode a simple-variant frame
    pub fn decode_simple(raw: &[u8]) -> Result<Frame> {
        if raw.len() < MIN_SIMPLE_FRAME {
            return Err(VeBusError::frame(format!(
                "simple frame too short: {} bytes",
                raw.len()
            )));
        }
        if raw[0] != SYNC_BYTE {
            return Err(VeBusError::frame(format!(
                "bad sync byte 0x{:02X}",
                raw[0]
            )));
        }
        let address = raw[1];
        let command = raw[2];
        let length = raw[3] as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(VeBusError::frame(format!(
                "declared length {length} exceeds max payload"
            )));
        }
        if raw.len() != SIMPLE_HEADER_SIZE + length + 1 {
            return Err(VeBusError::frame(format!(
                "simple frame length mismatch: declared {length}, got {} bytes",
                raw.len()
            )));
        }
        let payload = &raw[SIMPLE_HEADER_SIZE..SIMPLE_HEADER_SIZE + length];
        let checksum = raw[SIMPLE_HEADER_SIZE + length];
        let expected = simple_checksum(address, command, length as u8, payload);
        if checksum != expected {
            return Err(VeBusError::checksum(format!(
                "simple frame cmd 0x{command:02X}: got 0x{checksum:02X}, expected 0x{expected:02X}"
            )));
        }
        Ok(Frame::simple(address, command, payload.to_vec()))
    }

    /// Decode an extended-variant frame (raw bytes including the end marker)
    pub fn decode_extended(raw: &[u8]) -> Result<Frame> {
        if raw.len() < MIN_EXTENDED_FRAME {
            return Err(VeBusError::frame(format!(
                "extended frame too short: {} bytes",
                raw.len()
            )));
        }
        if raw[0] != EXT_HEADER1 || raw[1] != EXT_HEADER2 {
            return Err(VeBusError::frame(format!(
                "bad extended header 0x{:02X} 0x{:02X}",
                raw[0], raw[1]
            )));
        }
        if raw[2] != EXT_FRAME_TYPE_DATA {
            return Err(VeBusError::frame(format!(
                "unsupported frame type 0x{:02X}",
                raw[2]
            )));
        }
        if raw[raw.len() - 1] != EXT_END_MARKER {
            return Err(VeBusError::frame("missing end marker"));
        }
        let sequence = raw[3];

        // Destuff the region between the header and the end marker, keeping
        // each logical byte's wire offset; the last logical byte is the
        // checksum and its wire offset bounds the checksum computation.
        let region = &raw[4..raw.len() - 1];
        let mut logical: Vec<u8> = Vec::with_capacity(region.len());
        let mut wire_starts: Vec<usize> = Vec::with_capacity(region.len());
        let mut i = 0;
        while i < region.len() {
            let b = region[i];
            if b == STUFF_MARKER && i + 1 < region.len() {
                let esc = region[i + 1];
                if !(0x70..=0x7F).contains(&esc) {
                    return Err(VeBusError::frame(format!(
                        "invalid escape byte 0x{esc:02X} after stuff marker"
                    )));
                }
                logical.push(destuff_escape(esc));
                wire_starts.push(i);
                i += 2;
            } else {
                // A trailing stuff marker with no successor is a literal
                // 0xFA checksum, which sits below the checksum stuffing
                // threshold.
                logical.push(b);
                wire_starts.push(i);
                i += 1;
            }
        }

        if logical.len() < 3 {
            return Err(VeBusError::frame(format!(
                "extended frame body too short: {} logical bytes",
                logical.len()
            )));
        }

        let checksum = logical[logical.len() - 1];
        let cs_wire_start = 4 + wire_starts[logical.len() - 1];
        let mut expected: u8 = 1;
        for &b in &raw[2..cs_wire_start] {
            expected = expected.wrapping_sub(b);
        }
        if checksum != expected {
            return Err(VeBusError::checksum(format!(
                "extended frame seq {sequence}: got 0x{checksum:02X}, expected 0x{expected:02X}"
            )));
        }

        let address = logical[0];
        let command = logical[1];
        let payload = logical[2..logical.len() - 1].to_vec();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(VeBusError::frame(format!(
                "payload too large: {} bytes",
                payload.len()
            )));
        }
        Ok(Frame::extended(address, command, sequence, payload))
    }
}

/// Simple-variant checksum: `0x55 - (addr + cmd + len + payload)` mod 256
pub fn simple_checksum(address: u8, command: u8, length: u8, payload: &[u8]) -> u8 {
    let mut cs: u8 = 0x55u8
        .wrapping_sub(address)
        .wrapping_sub(command)
        .wrapping_sub(length);
    for &b in payload {
        cs = cs.wrapping_sub(b);
    }
    cs
}

/// Append `b` to `out`, stuffing it when it falls in the reserved range
fn stuff_byte(out: &mut Vec<u8>, b: u8) {
    if b >= STUFF_THRESHOLD {
        out.push(STUFF_MARKER);
        out.push(0x70 | (b & 0x0F));
    } else {
        out.push(b);
    }
}

/// Canonical inverse of the stuffing rule: `0xF0 | (escape & 0x0F)`
fn destuff_escape(esc: u8) -> u8 {
    0xF0 | (esc & 0x0F)
}
