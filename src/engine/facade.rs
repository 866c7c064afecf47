//! Synchronous request facade
//!
//! Queries hand the driver loop a one-shot reply slot and await it; the
//! loop fulfils the slot from the first matching inbound frame or drops it
//! at the response deadline. Callers never poll and never touch the bus.

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use super::VeBusEngine;
use crate::protocol::messages::{
    DeviceStatusInfo, ErrorInfo, LedDetail, VersionInfo, WarningInfo,
};
use crate::protocol::{Frame, VeBusCodec};

/// A query on its way to the driver loop
#[derive(Debug)]
pub struct SyncRequest {
    pub frame: Frame,
    pub reply: oneshot::Sender<Frame>,
}

/// A sent query waiting for its reply inside the driver loop
#[derive(Debug)]
pub struct SyncSlot {
    pub command: u8,
    pub reply: oneshot::Sender<Frame>,
    pub deadline: Instant,
}

impl SyncSlot {
    pub fn matches(&self, frame: &Frame) -> bool {
        frame.command == self.command
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

impl VeBusEngine {
    /// Send a query frame and wait for the matching reply
    ///
    /// Returns `None` when the engine is stopped, the query slot is busy,
    /// or no reply arrives within the response timeout.
    pub async fn sync_request(&self, frame: Frame) -> Option<Frame> {
        if !self.is_running() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        if self
            .sync_tx
            .try_send(SyncRequest { frame, reply: tx })
            .is_err()
        {
            debug!("query rejected, slot busy or engine stopping");
            return None;
        }
        // The driver loop drops the sender at the response deadline, which
        // resolves `rx` immediately; the outer timeout only guards against
        // a stalled loop.
        match tokio::time::timeout(self.response_timeout * 2, rx).await {
            Ok(Ok(frame)) => Some(frame),
            _ => None,
        }
    }

    pub async fn request_version(&self) -> Option<VersionInfo> {
        self.sync_request(VeBusCodec::version_request())
            .await
            .and_then(|f| VersionInfo::from_frame(&f))
    }

    pub async fn request_device_status(&self) -> Option<DeviceStatusInfo> {
        self.sync_request(VeBusCodec::device_status_request())
            .await
            .and_then(|f| DeviceStatusInfo::from_frame(&f))
    }

    pub async fn request_error_info(&self) -> Option<ErrorInfo> {
        self.sync_request(VeBusCodec::error_info_request())
            .await
            .and_then(|f| ErrorInfo::from_frame(&f))
    }

    pub async fn request_warning_info(&self) -> Option<WarningInfo> {
        self.sync_request(VeBusCodec::warning_info_request())
            .await
            .and_then(|f| WarningInfo::from_frame(&f))
    }

    pub async fn request_led_detail(&self) -> Option<LedDetail> {
        self.sync_request(VeBusCodec::led_status_request())
            .await
            .and_then(|f| LedDetail::from_frame(&f))
    }
}
