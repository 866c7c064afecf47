//! Bus transport abstraction
//!
//! The driver loop owns exactly one [`BusTransport`] and one
//! [`TransceiverControl`]. Reads are non-blocking drains so the loop never
//! stalls on a quiet bus; writes flush before returning so the direction
//! toggle can be released. The serial implementation targets the RS485
//! half-duplex wiring used on the bridge hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::{Result, VeBusError};

/// Raw byte channel to the bus
#[async_trait]
pub trait BusTransport: Send {
    /// Read whatever bytes are currently available into `buf` without
    /// waiting for more; returns 0 when the bus is quiet
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all bytes and flush
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Transceiver direction control for half-duplex wiring
///
/// The driver loop brackets every transmit with these calls. Toggles are
/// infallible and never retried; a transceiver that cannot toggle is a
/// wiring fault outside the protocol's scope.
pub trait TransceiverControl: Send {
    fn set_transmit(&mut self);
    fn set_receive(&mut self);
}

/// No-op direction control for transceivers handled in hardware or for
/// full-duplex test rigs
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransceiver;

impl TransceiverControl for NullTransceiver {
    fn set_transmit(&mut self) {}
    fn set_receive(&mut self) {}
}

/// Serial port transport backed by tokio-serial
pub struct SerialBusTransport {
    port: SerialStream,
}

impl SerialBusTransport {
    /// Open the serial device; must be called within a tokio runtime
    pub fn open(device: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(device, baud_rate)
            .open_native_async()
            .map_err(|e| VeBusError::transport(format!("failed to open {device}: {e}")))?;
        debug!(device, baud_rate, "serial port opened");
        Ok(Self { port })
    }
}

#[async_trait]
impl BusTransport for SerialBusTransport {
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        // Bounded poll: a quiet bus yields 0 within a millisecond instead of
        // parking the driver loop on the read.
        match tokio::time::timeout(Duration::from_millis(1), self.port.read(buf)).await {
            Err(_) => Ok(0),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Ok(Err(e)) => Err(VeBusError::io(format!("serial read: {e}"))),
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .await
            .map_err(|e| VeBusError::send(format!("serial write: {e}")))?;
        self.port
            .flush()
            .await
            .map_err(|e| VeBusError::send(format!("serial flush: {e}")))?;
        Ok(())
    }
}

/// In-memory transport used by the test suite
///
/// Bytes injected through the [`MockBusHandle`] become readable by the
/// engine; every engine send is recorded (attempts are counted even when
/// sends are forced to fail).
#[derive(Debug, Default)]
pub struct MockTransport {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<Vec<u8>>>>,
    send_attempts: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
}

/// Cloneable test-side handle to a [`MockTransport`]
#[derive(Debug, Clone)]
pub struct MockBusHandle {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<Vec<u8>>>>,
    send_attempts: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> (Self, MockBusHandle) {
        let transport = Self::default();
        let handle = MockBusHandle {
            inbound: transport.inbound.clone(),
            outbound: transport.outbound.clone(),
            send_attempts: transport.send_attempts.clone(),
            fail_sends: transport.fail_sends.clone(),
        };
        (transport, handle)
    }
}

impl MockBusHandle {
    /// Queue bytes for the engine to read
    pub fn inject(&self, bytes: &[u8]) {
        self.inbound.lock().extend(bytes.iter().copied());
    }

    /// Raw byte sequences the engine sent, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().clone()
    }

    /// Total send calls, including failed ones
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::Relaxed)
    }

    /// Force every subsequent send to fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl BusTransport for MockTransport {
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inbound = self.inbound.lock();
        let mut n = 0;
        while n < buf.len() {
            match inbound.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.send_attempts.fetch_add(1, Ordering::Relaxed);
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(VeBusError::send("mock transport send failure"));
        }
        self.outbound.lock().push(bytes.to_vec());
        Ok(())
    }
}
