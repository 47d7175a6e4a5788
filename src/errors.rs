use std::fmt;

/// Errors raised by camera backends.
///
/// These never leave the session controller as-is: acquisition failures are
/// folded into [`AcquisitionError`] and constraint failures into a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    InitializationError(String),
    PermissionDenied(String),
    DeviceBusy(String),
    CaptureError(String),
    ControlError(String),
    StreamError(String),
    UnsupportedOperation(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CameraError::InitializationError(msg) => write!(f, "Camera initialization error: {}", msg),
            CameraError::PermissionDenied(msg) => write!(f, "Permission denied error: {}", msg),
            CameraError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            CameraError::CaptureError(msg) => write!(f, "Capture error: {}", msg),
            CameraError::ControlError(msg) => write!(f, "Camera control error: {}", msg),
            CameraError::StreamError(msg) => write!(f, "Stream error: {}", msg),
            CameraError::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

/// Camera enumeration failed. Callers recover by presenting an empty list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnumerationError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera enumeration failed: {0}")]
    Backend(String),
}

impl From<CameraError> for EnumerationError {
    fn from(error: CameraError) -> Self {
        match error {
            CameraError::PermissionDenied(msg) => EnumerationError::PermissionDenied(msg),
            other => EnumerationError::Backend(other.to_string()),
        }
    }
}

/// Acquiring a camera for a scan session failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("camera {0} is not available")]
    DeviceUnavailable(String),
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera is busy: {0}")]
    DeviceBusy(String),
    #[error("scan configuration rejected: {0}")]
    ConfigRejected(String),
    #[error("acquisition cancelled")]
    Cancelled,
    #[error("cannot start while session is {0}")]
    InvalidState(String),
    #[error("acquisition failed: {0}")]
    Platform(String),
}

impl AcquisitionError {
    /// Translate a backend error raised while acquiring `device_id`.
    pub fn from_camera(device_id: &str, error: CameraError) -> Self {
        match error {
            CameraError::PermissionDenied(msg) => AcquisitionError::PermissionDenied(msg),
            CameraError::DeviceBusy(msg) => AcquisitionError::DeviceBusy(msg),
            CameraError::UnsupportedOperation(msg) => AcquisitionError::ConfigRejected(msg),
            CameraError::InitializationError(msg) if msg.contains("not found") => {
                AcquisitionError::DeviceUnavailable(device_id.to_string())
            }
            other => AcquisitionError::Platform(other.to_string()),
        }
    }
}

/// The decode capability could not process its input at all.
///
/// "No code in the image" is not an error; it is reported as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unreadable image: {0}")]
    InvalidImage(String),
    #[error("frame buffer does not match {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("decoder task failed: {0}")]
    Task(String),
}

/// The notification transport failed. Messages are redacted before construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("notification endpoint unreachable: {0}")]
    Transport(String),
    #[error("notification endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("notification endpoint response malformed: {0}")]
    InvalidResponse(String),
}

/// Configuration could not be loaded, saved or validated.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Umbrella error for callers that drive the whole flow.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
