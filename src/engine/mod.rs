//! Protocol engine
//!
//! [`VeBusEngine`] is the cloneable handle applications hold: command
//! submission, synchronous queries, state and statistics snapshots. All bus
//! work happens on a single spawned driver task; the handle only talks to
//! it through channels and shared read-side structures.

pub mod driver;
pub mod facade;
pub mod queue;
pub mod state;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::protocol::messages::SwitchState;
use crate::protocol::{Frame, VeBusCodec};
use crate::transport::{BusTransport, NullTransceiver, SerialBusTransport, TransceiverControl};

use driver::DriverContext;
use facade::SyncRequest;
use queue::{PendingCommand, RetryPolicy};
use state::{DeviceState, StateStore, Statistics, StatisticsSnapshot};

/// Handle to a running protocol engine
#[derive(Clone)]
pub struct VeBusEngine {
    queue_tx: mpsc::Sender<PendingCommand>,
    pub(crate) sync_tx: mpsc::Sender<SyncRequest>,
    store: Arc<StateStore>,
    stats: Arc<Statistics>,
    running: Arc<AtomicBool>,
    next_command_id: Arc<AtomicU8>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub(crate) response_timeout: Duration,
}

impl VeBusEngine {
    /// Start the engine over the given transport and transceiver
    pub fn start(
        config: &BridgeConfig,
        transport: Box<dyn BusTransport>,
        transceiver: Box<dyn TransceiverControl>,
    ) -> Result<Self> {
        config.validate()?;

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let (sync_tx, sync_rx) = mpsc::channel(1);
        let store = Arc::new(StateStore::new(config.staleness_timeout()));
        let stats = Arc::new(Statistics::new());
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));

        let ctx = DriverContext {
            transport,
            transceiver,
            store: store.clone(),
            stats: stats.clone(),
            queue_rx,
            queue_tx: queue_tx.clone(),
            sync_rx,
            policy: RetryPolicy::new(u32::from(config.max_retries), config.response_timeout()),
            tick: config.tick_interval(),
            frame_timeout: config.frame_timeout(),
        };

        let task_running = running.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            driver::run(ctx, task_cancel).await;
            task_running.store(false, Ordering::SeqCst);
        });

        info!(
            queue_capacity = config.queue_capacity,
            max_retries = config.max_retries,
            "engine started"
        );
        Ok(Self {
            queue_tx,
            sync_tx,
            store,
            stats,
            running,
            next_command_id: Arc::new(AtomicU8::new(1)),
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
            response_timeout: config.response_timeout(),
        })
    }

    /// Start the engine on the configured serial device
    pub fn start_serial(config: &BridgeConfig) -> Result<Self> {
        let transport = SerialBusTransport::open(&config.device, config.baud_rate)?;
        Self::start(config, Box::new(transport), Box::new(NullTransceiver))
    }

    /// Stop the driver task and wait for it to finish
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if task.await.is_err() {
                warn!("driver task panicked during shutdown");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn next_command_id(&self) -> u8 {
        self.next_command_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueue a frame; returns false when stopped or the queue is full
    fn submit(&self, frame: Frame, await_response: bool) -> bool {
        if !self.is_running() {
            return false;
        }
        let cmd = PendingCommand::new(frame, await_response, Instant::now());
        self.queue_tx.try_send(cmd).is_ok()
    }

    /// ESS power setpoint in W; positive charges, negative discharges
    pub fn submit_ess_power(&self, watts: i16) -> bool {
        self.submit(VeBusCodec::ess_power(watts, self.next_command_id()), true)
    }

    /// AC input current limit in A
    pub fn submit_input_current_limit(&self, amps: u8) -> bool {
        self.submit(
            VeBusCodec::input_current_limit(amps, self.next_command_id()),
            true,
        )
    }

    /// Main switch position
    pub fn submit_switch_state(&self, state: SwitchState) -> bool {
        self.submit(
            VeBusCodec::switch_state(state, self.next_command_id()),
            true,
        )
    }

    pub fn submit_device_reset(&self) -> bool {
        self.submit(VeBusCodec::device_reset(), false)
    }

    pub fn submit_clear_errors(&self) -> bool {
        self.submit(VeBusCodec::clear_errors(), false)
    }

    pub fn submit_auto_restart(&self, enable: bool) -> bool {
        self.submit(VeBusCodec::auto_restart(enable), false)
    }

    pub fn submit_voltage_range(&self, min_volts: f32, max_volts: f32) -> bool {
        self.submit(VeBusCodec::voltage_range(min_volts, max_volts), false)
    }

    pub fn submit_frequency_range(&self, min_hz: f32, max_hz: f32) -> bool {
        self.submit(VeBusCodec::frequency_range(min_hz, max_hz), false)
    }

    /// Enqueue an arbitrary pre-built frame
    pub fn submit_custom(&self, frame: Frame, await_response: bool) -> bool {
        self.submit(frame, await_response)
    }

    pub fn snapshot_device_state(&self) -> DeviceState {
        self.store.snapshot()
    }

    pub fn snapshot_statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    pub fn is_online(&self) -> bool {
        self.store.is_online(Instant::now())
    }

    pub fn communication_quality(&self) -> f64 {
        self.stats.communication_quality()
    }
}
