//! Error handling for the VE.Bus bridge
//!
//! One taxonomy for the whole crate. Transient bus conditions (checksum
//! mismatches, single send failures, response timeouts) never cross the
//! engine boundary as errors; they are retried locally and surfaced through
//! the statistics counters only.

use thiserror::Error;

/// VE.Bus bridge error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VeBusError {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input/output errors on the serial channel
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed frames (bad header, invalid escape, truncated buffer)
    #[error("Frame error: {0}")]
    Frame(String),

    /// Frame failed checksum validation
    #[error("Checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// No frame boundary found within the staleness window
    #[error("Frame timeout: {0}")]
    FrameTimeout(String),

    /// Transport write did not complete
    #[error("Send failure: {0}")]
    SendFailure(String),

    /// Awaited acknowledgement never observed
    #[error("Response timeout: {0}")]
    ResponseTimeout(String),

    /// Command queue is full; the submission was rejected
    #[error("Command queue full")]
    QueueFull,

    /// Operation attempted before start or after stop
    #[error("Engine not running")]
    NotRunning,

    /// Transport-level errors (port open, direction control)
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for the VE.Bus bridge
pub type Result<T> = std::result::Result<T, VeBusError>;

impl VeBusError {
    pub fn config(msg: impl Into<String>) -> Self {
        VeBusError::Config(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        VeBusError::Io(msg.into())
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        VeBusError::Frame(msg.into())
    }

    pub fn checksum(msg: impl Into<String>) -> Self {
        VeBusError::ChecksumMismatch(msg.into())
    }

    pub fn send(msg: impl Into<String>) -> Self {
        VeBusError::SendFailure(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        VeBusError::Transport(msg.into())
    }
}

impl From<std::io::Error> for VeBusError {
    fn from(err: std::io::Error) -> Self {
        VeBusError::Io(err.to_string())
    }
}
