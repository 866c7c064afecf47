//! Device state store and communication statistics
//!
//! The store is the single authoritative snapshot of last-known device
//! values. Only the driver loop mutates it; every other task reads copies.
//! Statistics are monotonic atomic counters with the driver loop as sole
//! writer, so readers need no lock.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

use crate::protocol::constants::*;
use crate::protocol::messages::{AcInfo, DcInfo, LedState, SwitchState};
use crate::protocol::Frame;

/// Aggregated last-known device values
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceState {
    pub dc: DcInfo,
    pub ac: AcInfo,
    pub led: LedState,
    /// Last acknowledged switch position, if any was observed
    pub switch_state: Option<SwitchState>,
    /// Instant of the last successful dispatch
    #[serde(skip)]
    pub last_update: Option<Instant>,
    /// True from the last successful dispatch until staleness clears it
    pub online: bool,
}

impl DeviceState {
    /// True when longer than `threshold` has passed since the last update
    /// (a never-updated state is always stale)
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        match self.last_update {
            Some(at) => now.duration_since(at) > threshold,
            None => true,
        }
    }
}

/// Outcome of dispatching a frame into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame updated one of the state sections
    Updated,
    /// The command code carries no state; counted and ignored
    Unknown,
}

/// Mutex-guarded device state with staleness bookkeeping
#[derive(Debug)]
pub struct StateStore {
    inner: Mutex<DeviceState>,
    staleness: Duration,
}

impl StateStore {
    pub fn new(staleness: Duration) -> Self {
        Self {
            inner: Mutex::new(DeviceState::default()),
            staleness,
        }
    }

    /// Copy of the current state; the lock is held for the copy only
    pub fn snapshot(&self) -> DeviceState {
        self.inner.lock().clone()
    }

    /// Apply a validated inbound frame; driver loop only
    pub fn dispatch(&self, frame: &Frame, now: Instant) -> DispatchOutcome {
        let mut state = self.inner.lock();
        let outcome = match frame.command {
            CMD_DC_INFO => match DcInfo::from_frame(frame) {
                Some(dc) => {
                    state.dc = dc;
                    DispatchOutcome::Updated
                }
                None => DispatchOutcome::Unknown,
            },
            CMD_AC_INFO => match AcInfo::from_frame(frame) {
                Some(ac) => {
                    state.ac = ac;
                    DispatchOutcome::Updated
                }
                None => DispatchOutcome::Unknown,
            },
            CMD_LED_STATUS => match LedState::from_frame(frame) {
                Some(led) => {
                    state.led = led;
                    DispatchOutcome::Updated
                }
                None => DispatchOutcome::Unknown,
            },
            CMD_SET_SWITCH => match frame.payload.first().and_then(|&b| SwitchState::from_raw(b)) {
                Some(ack) => {
                    state.switch_state = Some(ack);
                    DispatchOutcome::Updated
                }
                None => DispatchOutcome::Unknown,
            },
            other => {
                trace!(command = format_args!("0x{other:02X}"), "unknown frame command");
                DispatchOutcome::Unknown
            }
        };
        if outcome == DispatchOutcome::Updated {
            state.last_update = Some(now);
            state.online = true;
        }
        outcome
    }

    /// Clear the online flag once the state has gone stale; idempotent
    pub fn mark_offline_if_stale(&self, now: Instant) {
        let mut state = self.inner.lock();
        if state.online && state.is_stale(now, self.staleness) {
            state.online = false;
        }
    }

    /// Online means a successful update happened within the staleness window
    pub fn is_online(&self, now: Instant) -> bool {
        let state = self.inner.lock();
        state.online && !state.is_stale(now, self.staleness)
    }
}

/// Monotonic communication counters; single writer, lock-free readers
#[derive(Debug)]
pub struct Statistics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    checksum_errors: AtomicU64,
    timeout_errors: AtomicU64,
    retransmissions: AtomicU64,
    unknown_frames: AtomicU64,
    last_reset_ms: AtomicI64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            checksum_errors: AtomicU64::new(0),
            timeout_errors: AtomicU64::new(0),
            retransmissions: AtomicU64::new(0),
            unknown_frames: AtomicU64::new(0),
            last_reset_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }
}

/// Point-in-time copy of the statistics counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub checksum_errors: u64,
    pub timeout_errors: u64,
    pub retransmissions: u64,
    pub unknown_frames: u64,
    pub last_reset: DateTime<Utc>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_frames_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_checksum_errors(&self) {
        self.checksum_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeout_errors(&self) {
        self.timeout_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retransmissions(&self) {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unknown_frames(&self) {
        self.unknown_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            timeout_errors: self.timeout_errors.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            unknown_frames: self.unknown_frames.load(Ordering::Relaxed),
            last_reset: Utc
                .timestamp_millis_opt(self.last_reset_ms.load(Ordering::Relaxed))
                .single()
                .unwrap_or_else(Utc::now),
        }
    }

    /// Zero every counter; explicit operator action only
    pub fn reset(&self) {
        self.frames_sent.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.checksum_errors.store(0, Ordering::Relaxed);
        self.timeout_errors.store(0, Ordering::Relaxed);
        self.retransmissions.store(0, Ordering::Relaxed);
        self.unknown_frames.store(0, Ordering::Relaxed);
        self.last_reset_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Error rate summary in [0, 1]: `1 - errors / (sent + received)`,
    /// 0.0 before any traffic
    pub fn communication_quality(&self) -> f64 {
        let snapshot = self.snapshot();
        let total = snapshot.frames_sent + snapshot.frames_received;
        if total == 0 {
            return 0.0;
        }
        let errors =
            snapshot.checksum_errors + snapshot.timeout_errors + snapshot.frames_dropped;
        (1.0 - errors as f64 / total as f64).max(0.0)
    }
}
