//! Incremental frame assembler
//!
//! Byte-level state machine feeding the frame decoder. Bytes are discarded
//! until a recognized frame-start marker appears, then buffered until the
//! variant's boundary condition holds: declared length for the simple
//! variant, end marker for the extended one. Overflow and stale partial
//! buffers reset the machine; the driver loop maps the reported events onto
//! the statistics counters.

use tokio::time::Instant;
use tracing::trace;

use super::constants::*;
use super::frame::{Frame, FrameVariant};
use crate::error::VeBusError;

/// Outcome of feeding one byte
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblerEvent {
    /// A complete frame passed decode and checksum validation
    Frame(Frame),
    /// A complete buffer failed decode or checksum validation
    ChecksumError(VeBusError),
    /// No frame boundary found before the buffer cap
    Overflow,
}

/// Byte-stream state machine producing validated frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    variant: Option<FrameVariant>,
    last_rx: Option<Instant>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received byte; returns an event when the byte completes a
    /// frame, invalidates the buffer, or overflows it
    pub fn feed(&mut self, byte: u8, now: Instant) -> Option<AssemblerEvent> {
        self.last_rx = Some(now);

        if self.buf.is_empty() {
            match byte {
                SYNC_BYTE => self.variant = Some(FrameVariant::Simple),
                EXT_HEADER1 => self.variant = Some(FrameVariant::Extended),
                _ => return None,
            }
            self.buf.push(byte);
            return None;
        }

        // Cheap early reject: the second extended byte is fixed, so a stray
        // 0x98 does not swallow the stream until the next 0xFF.
        if self.variant == Some(FrameVariant::Extended) && self.buf.len() == 1 && byte != EXT_HEADER2
        {
            self.reset();
            return self.feed(byte, now);
        }

        if self.buf.len() >= MAX_FRAME_SIZE {
            self.reset();
            return Some(AssemblerEvent::Overflow);
        }
        self.buf.push(byte);

        if !self.is_complete() {
            return None;
        }

        let result = Frame::decode(&self.buf);
        self.reset();
        match result {
            Ok(frame) => {
                trace!(
                    command = format_args!("0x{:02X}", frame.command),
                    payload_len = frame.payload.len(),
                    "frame assembled"
                );
                Some(AssemblerEvent::Frame(frame))
            }
            Err(err) => Some(AssemblerEvent::ChecksumError(err)),
        }
    }

    /// Discard a partial buffer older than `timeout` since the last byte;
    /// returns true when something was discarded
    pub fn expire_stale(&mut self, now: Instant, timeout: std::time::Duration) -> bool {
        if self.buf.is_empty() {
            return false;
        }
        match self.last_rx {
            Some(last) if now.duration_since(last) > timeout => {
                trace!(buffered = self.buf.len(), "discarding stale partial frame");
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn is_complete(&self) -> bool {
        match self.variant {
            Some(FrameVariant::Simple) => {
                self.buf.len() >= SIMPLE_HEADER_SIZE
                    && self.buf.len() == SIMPLE_HEADER_SIZE + self.buf[3] as usize + 1
            }
            Some(FrameVariant::Extended) => {
                self.buf.len() >= MIN_EXTENDED_FRAME
                    && self.buf.last() == Some(&EXT_END_MARKER)
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.variant = None;
    }
}
