//! Bus driver loop
//!
//! Single task owning the transport, the assembler, the command queue and
//! the reply slots. Each tick drains inbound bytes, services at most one
//! query and one queued command, enforces the response deadline and the
//! staleness window. Half-duplex discipline: the transceiver is switched
//! to transmit only for the duration of one frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::facade::{SyncRequest, SyncSlot};
use super::queue::{AwaitingSlot, PendingCommand, RetryPolicy};
use super::state::{DispatchOutcome, StateStore, Statistics};
use crate::protocol::{AssemblerEvent, Frame, FrameAssembler};
use crate::transport::{BusTransport, TransceiverControl};

const READ_CHUNK: usize = 256;

/// Everything the driver task owns
pub struct DriverContext {
    pub transport: Box<dyn BusTransport>,
    pub transceiver: Box<dyn TransceiverControl>,
    pub store: Arc<StateStore>,
    pub stats: Arc<Statistics>,
    pub queue_rx: mpsc::Receiver<PendingCommand>,
    /// Requeue side of the command channel, used for retries
    pub queue_tx: mpsc::Sender<PendingCommand>,
    pub sync_rx: mpsc::Receiver<SyncRequest>,
    pub policy: RetryPolicy,
    pub tick: Duration,
    pub frame_timeout: Duration,
}

struct Driver {
    ctx: DriverContext,
    assembler: FrameAssembler,
    awaiting: Option<AwaitingSlot>,
    sync_slot: Option<SyncSlot>,
}

/// Run the driver until cancelled; consumes the context
pub async fn run(ctx: DriverContext, cancel: CancellationToken) {
    let tick = ctx.tick;
    let mut driver = Driver {
        ctx,
        assembler: FrameAssembler::new(),
        awaiting: None,
        sync_slot: None,
    };
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(tick_ms = tick.as_millis() as u64, "bus driver started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            instant = interval.tick() => driver.cycle(instant).await,
        }
    }
    info!("bus driver stopped");
}

impl Driver {
    async fn cycle(&mut self, now: Instant) {
        self.drain_inbound(now).await;
        if self.assembler.expire_stale(now, self.ctx.frame_timeout) {
            self.ctx.stats.inc_frames_dropped();
        }
        self.service_sync_request(now).await;
        self.service_queue(now).await;
        self.enforce_deadlines(now);
        self.ctx.store.mark_offline_if_stale(now);
    }

    async fn drain_inbound(&mut self, now: Instant) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = match self.ctx.transport.read_available(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    warn!(error = %err, "bus read failed");
                    break;
                }
            };
            for &byte in &buf[..n] {
                match self.assembler.feed(byte, now) {
                    Some(AssemblerEvent::Frame(frame)) => self.handle_frame(frame, now),
                    Some(AssemblerEvent::ChecksumError(err)) => {
                        debug!(error = %err, "inbound frame rejected");
                        self.ctx.stats.inc_checksum_errors();
                    }
                    Some(AssemblerEvent::Overflow) => {
                        warn!("inbound buffer overflow, frame dropped");
                        self.ctx.stats.inc_frames_dropped();
                    }
                    None => {}
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, now: Instant) {
        self.ctx.stats.inc_frames_received();

        let mut consumed = false;
        if self.sync_slot.as_ref().is_some_and(|s| s.matches(&frame)) {
            if let Some(slot) = self.sync_slot.take() {
                // A dropped receiver just means the caller gave up first
                let _ = slot.reply.send(frame.clone());
                consumed = true;
            }
        }
        if self.awaiting.as_ref().is_some_and(|s| s.matches(&frame)) {
            debug!(
                command = format_args!("0x{:02X}", frame.command),
                "command acknowledged"
            );
            self.awaiting = None;
            consumed = true;
        }

        if self.ctx.store.dispatch(&frame, now) == DispatchOutcome::Unknown && !consumed {
            self.ctx.stats.inc_unknown_frames();
        }
    }

    async fn service_sync_request(&mut self, now: Instant) {
        if self.sync_slot.is_some() {
            return;
        }
        let Ok(request) = self.ctx.sync_rx.try_recv() else {
            return;
        };
        let command = request.frame.command;
        match self.send_frame(&request.frame).await {
            Ok(()) => {
                self.ctx.stats.inc_frames_sent();
                self.sync_slot = Some(SyncSlot {
                    command,
                    reply: request.reply,
                    deadline: now + self.ctx.policy.response_timeout,
                });
            }
            Err(err) => {
                warn!(error = %err, command = format_args!("0x{command:02X}"), "query send failed");
                self.ctx.stats.inc_frames_dropped();
                // Dropping the reply sender resolves the caller with None
            }
        }
    }

    async fn service_queue(&mut self, now: Instant) {
        if self.awaiting.is_some() {
            return;
        }
        let Ok(cmd) = self.ctx.queue_rx.try_recv() else {
            return;
        };
        match self.send_frame(&cmd.frame).await {
            Ok(()) => {
                self.ctx.stats.inc_frames_sent();
                if cmd.await_response {
                    self.awaiting = Some(AwaitingSlot::new(cmd, now, &self.ctx.policy));
                }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    command = format_args!("0x{:02X}", cmd.frame.command),
                    attempt = cmd.retry_count + 1,
                    "command send failed"
                );
                self.ctx.stats.inc_frames_dropped();
                self.retry_or_abandon(cmd);
            }
        }
    }

    fn enforce_deadlines(&mut self, now: Instant) {
        if self.awaiting.as_ref().is_some_and(|s| s.expired(now)) {
            if let Some(slot) = self.awaiting.take() {
                warn!(
                    command = format_args!("0x{:02X}", slot.cmd.frame.command),
                    attempt = slot.cmd.retry_count + 1,
                    "response timeout"
                );
                self.ctx.stats.inc_timeout_errors();
                self.retry_or_abandon(slot.cmd);
            }
        }

        let sync_dead = self
            .sync_slot
            .as_ref()
            .is_some_and(|s| s.expired(now) || s.reply.is_closed());
        if sync_dead {
            if let Some(slot) = self.sync_slot.take() {
                debug!(
                    command = format_args!("0x{:02X}", slot.command),
                    "query expired without reply"
                );
            }
        }
    }

    fn retry_or_abandon(&mut self, cmd: PendingCommand) {
        if self.ctx.policy.should_retry(&cmd) {
            self.ctx.stats.inc_retransmissions();
            // Requeued at the back so newer commands are not starved
            if self.ctx.queue_tx.try_send(cmd.next_attempt()).is_err() {
                warn!("queue full, retry abandoned");
            }
        } else {
            warn!(
                command = format_args!("0x{:02X}", cmd.frame.command),
                attempts = cmd.retry_count + 1,
                "command abandoned"
            );
        }
    }

    async fn send_frame(&mut self, frame: &Frame) -> crate::error::Result<()> {
        let bytes = frame.encode()?;
        self.ctx.transceiver.set_transmit();
        let result = self.ctx.transport.send(&bytes).await;
        self.ctx.transceiver.set_receive();
        result
    }
}
