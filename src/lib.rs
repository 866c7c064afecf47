//! VE.Bus bridge
//!
//! Protocol engine for Victron MultiPlus-class inverter/chargers on a
//! half-duplex serial bus. A single driver task owns the wire; applications
//! hold a cloneable [`VeBusEngine`] handle for command submission,
//! synchronous queries and state/statistics snapshots.
//!
//! ```no_run
//! use vebus_bridge::{BridgeConfig, VeBusEngine};
//!
//! # async fn demo() -> vebus_bridge::Result<()> {
//! let config = BridgeConfig::default();
//! let engine = VeBusEngine::start_serial(&config)?;
//!
//! engine.submit_ess_power(-1500);
//! if let Some(version) = engine.request_version().await {
//!     println!("firmware {}", version.firmware_version);
//! }
//! let dc = engine.snapshot_device_state().dc;
//! println!("battery {:.2} V", dc.voltage);
//!
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::BridgeConfig;
pub use engine::state::{DeviceState, StatisticsSnapshot};
pub use engine::VeBusEngine;
pub use error::{Result, VeBusError};
pub use protocol::{
    AcInfo, DcInfo, DeviceStatus, DeviceStatusInfo, ErrorInfo, Frame, FrameVariant, LedDetail,
    LedState, SwitchState, VeBusCodec, VersionInfo, WarningInfo,
};
