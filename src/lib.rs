//! crabscan: single-fire QR scan sessions with arrival notifications
//!
//! A [`ScanController`] owns one camera acquisition at a time, accepts the
//! first successful decode of each session, fires an arrival notification
//! through a [`NotificationDispatcher`] and releases the camera.
//!
//! # Features
//! - Explicit acquisition state machine with cancellation
//! - Single-fire decode handling, stale events discarded
//! - Device switching without ever holding two cameras
//! - One-shot decoding of uploaded images
//! - HTTP send-message dispatcher with secret redaction
//! - Native camera backend over `nokhwa` (feature `native`)
//!
//! # Usage
//! ```rust,no_run
//! use crabscan::{HttpDispatcher, RqrrDecoder, ScanController};
//! use crabscan::config::CrabScanConfig;
//! use crabscan::testing::MockCamera;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CrabScanConfig::load_or_default();
//! let camera = Arc::new(MockCamera::new());
//! let controller = ScanController::from_config(
//!     &config,
//!     camera.clone(),
//!     Arc::new(RqrrDecoder::new()),
//!     Arc::new(HttpDispatcher::from_config(&config.notification)?),
//! );
//!
//! let devices = crabscan::list_devices(camera.as_ref()).await;
//! controller.start_default(&devices).await?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod decode;
pub mod devices;
pub mod errors;
pub mod notify;
pub mod platform;
pub mod session;
pub mod types;

// Testing utilities - scripted camera, decoder and dispatcher doubles
pub mod testing;

// Re-exports for convenience
pub use decode::{DecodeCapability, RqrrDecoder};
pub use devices::{default_device, list_devices};
pub use errors::{
    AcquisitionError, CameraError, ConfigError, DecodeError, DispatchError, EnumerationError,
    ScanError,
};
pub use notify::{
    DispatchReport, HttpDispatcher, LogDispatcher, NotificationDispatcher, NotificationRequest,
};
pub use platform::{CameraBackend, DeviceEnumerator};
pub use session::{Feedback, ScanController};
pub use types::{
    AcquisitionState, CameraDevice, ConstraintOutcome, DecodeEvent, DecodeOutcome, ScanConfig,
    ScanRegion, ScanSnapshot, StaticScanOutcome,
};

#[cfg(feature = "native")]
pub use platform::NativeCamera;

/// Initialize logging for the scanner
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabscan=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        native_backend: cfg!(feature = "native"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub native_backend: bool,
}
