use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A camera exposed by the host. Identity is the `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    pub label: String,
}

impl CameraDevice {
    /// Unlabeled devices are presented as `Camera <id>`.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let id = id.into();
        let label = label.into();
        let label = if label.trim().is_empty() {
            format!("Camera {}", id)
        } else {
            label
        };
        Self { id, label }
    }
}

/// Centred region of each frame handed to the decoder, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRegion {
    pub width: u32,
    pub height: u32,
}

/// Acquisition parameters for a live scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub frames_per_second: u32,
    pub scan_region: ScanRegion,
    /// Width/height ratio of the frame the scan region is centred in.
    /// Wider or taller frames are cropped to it before decoding.
    pub aspect_ratio: f32,
    /// Prefer a platform barcode detector when the backend has one.
    /// The nokhwa backend has none and always decodes with rqrr.
    pub experimental_detector_hint: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 15,
            scan_region: ScanRegion {
                width: 260,
                height: 260,
            },
            aspect_ratio: 1.7778,
            experimental_detector_hint: true,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_per_second == 0 || self.frames_per_second > 240 {
            return Err("frames_per_second must be between 1 and 240".to_string());
        }
        if self.scan_region.width == 0 || self.scan_region.height == 0 {
            return Err("scan_region must be non-empty".to_string());
        }
        if !self.aspect_ratio.is_finite() || self.aspect_ratio <= 0.0 {
            return Err("aspect_ratio must be a positive number".to_string());
        }
        Ok(())
    }

    /// Interval between decode attempts.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / u64::from(self.frames_per_second.max(1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionState {
    Idle,
    Acquiring,
    Active,
    Stopping,
    Error,
}

impl AcquisitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Acquiring => "acquiring",
            AcquisitionState::Active => "active",
            AcquisitionState::Stopping => "stopping",
            AcquisitionState::Error => "error",
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable view of the scan session, published on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSnapshot {
    pub session_id: Option<Uuid>,
    pub active_device_id: Option<String>,
    pub state: AcquisitionState,
    pub torch_enabled: bool,
    pub last_result: Option<String>,
    pub last_error: Option<String>,
}

impl Default for ScanSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            active_device_id: None,
            state: AcquisitionState::Idle,
            torch_enabled: false,
            last_result: None,
            last_error: None,
        }
    }
}

/// One successful decode pushed by a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeEvent {
    pub text: String,
    pub source_device_id: String,
}

impl DecodeEvent {
    pub fn new(text: impl Into<String>, source_device_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_device_id: source_device_id.into(),
        }
    }
}

/// Everything a live stream can push into the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Decoded(DecodeEvent),
    /// A frame without a readable code. Expected and frequent.
    DecodeFailure(String),
    /// The stream died underneath the session.
    Fault(String),
}

/// What the controller did with a decode event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Accepted,
    Discarded,
}

/// Result of a one-shot image scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StaticScanOutcome {
    Decoded(String),
    NoMatch,
}

/// Device capability constraints the controller knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Torch(bool),
}

impl Constraint {
    pub fn name(&self) -> &'static str {
        match self {
            Constraint::Torch(_) => "torch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOutcome {
    Applied,
    Unsupported(String),
}

/// Raw RGB8 frame as delivered by a camera backend.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub device_id: String,
}
