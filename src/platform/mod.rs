//! Platform boundary for camera acquisition.
//!
//! A [`CameraBackend`] owns at most one open camera. Live decode results are
//! pushed into the [`StreamSink`] handed over at start; the session controller
//! drains it on its own task.

use crate::errors::{CameraError, EnumerationError};
use crate::types::{CameraDevice, Constraint, ScanConfig, StreamEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[cfg(feature = "native")]
pub mod native;

#[cfg(feature = "native")]
pub use native::NativeCamera;

pub type StreamSink = mpsc::UnboundedSender<StreamEvent>;
pub type StreamReceiver = mpsc::UnboundedReceiver<StreamEvent>;

#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Open `device_id` and begin continuous decoding into `sink`.
    ///
    /// Dropping the returned future aborts the acquisition; the caller then
    /// calls [`CameraBackend::stop`] to release whatever was opened.
    async fn start(
        &self,
        device_id: &str,
        config: &ScanConfig,
        sink: StreamSink,
    ) -> Result<(), CameraError>;

    /// Release the camera. Must succeed when nothing is open.
    async fn stop(&self) -> Result<(), CameraError>;

    /// Returns `Ok(false)` when the device lacks the capability.
    async fn apply_constraint(&self, constraint: Constraint) -> Result<bool, CameraError>;
}

#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<CameraDevice>, EnumerationError>;
}
