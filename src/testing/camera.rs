use super::lock;
use crate::errors::{CameraError, EnumerationError};
use crate::platform::{CameraBackend, DeviceEnumerator, StreamSink};
use crate::types::{CameraDevice, Constraint, DecodeEvent, ScanConfig, StreamEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    devices: Vec<CameraDevice>,
    enumeration_error: Option<EnumerationError>,
    fail_devices: HashMap<String, CameraError>,
    torch_supported: bool,
    torch: bool,
    start_delay: Duration,
    stop_delay: Duration,
    constraint_delay: Duration,
    sink: Option<StreamSink>,
    active_device: Option<String>,
    open_handles: usize,
    max_open_handles: usize,
    start_calls: usize,
    stop_calls: usize,
}

/// In-memory camera that counts open handles.
///
/// `start` waits out its delay before opening anything, so dropping it
/// mid-flight leaves no handle behind.
#[derive(Default)]
pub struct MockCamera {
    state: Mutex<MockState>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cameras known to the mock. Starting any other id fails with "not found".
    pub fn with_devices(self, devices: Vec<CameraDevice>) -> Self {
        lock(&self.state).devices = devices;
        self
    }

    pub fn with_enumeration_error(self, error: EnumerationError) -> Self {
        lock(&self.state).enumeration_error = Some(error);
        self
    }

    pub fn with_failing_device(self, device_id: &str, error: CameraError) -> Self {
        lock(&self.state)
            .fail_devices
            .insert(device_id.to_string(), error);
        self
    }

    pub fn with_torch(self) -> Self {
        lock(&self.state).torch_supported = true;
        self
    }

    pub fn with_start_delay(self, delay: Duration) -> Self {
        lock(&self.state).start_delay = delay;
        self
    }

    pub fn with_stop_delay(self, delay: Duration) -> Self {
        lock(&self.state).stop_delay = delay;
        self
    }

    /// Delay before a constraint reaches the device.
    pub fn with_constraint_delay(self, delay: Duration) -> Self {
        lock(&self.state).constraint_delay = delay;
        self
    }

    /// Push a raw event into the open stream. Returns false when nothing is open.
    pub fn emit(&self, event: StreamEvent) -> bool {
        match &lock(&self.state).sink {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Decode event attributed to the currently open device.
    pub fn emit_decoded(&self, text: &str) -> bool {
        let Some(device_id) = self.active_device() else {
            return false;
        };
        self.emit_decoded_from(&device_id, text)
    }

    /// Decode event attributed to an arbitrary device, for stale-event checks.
    pub fn emit_decoded_from(&self, device_id: &str, text: &str) -> bool {
        self.emit(StreamEvent::Decoded(DecodeEvent::new(text, device_id)))
    }

    pub fn active_device(&self) -> Option<String> {
        lock(&self.state).active_device.clone()
    }

    pub fn open_handles(&self) -> usize {
        lock(&self.state).open_handles
    }

    /// Highest number of simultaneously open handles ever observed.
    pub fn max_open_handles(&self) -> usize {
        lock(&self.state).max_open_handles
    }

    pub fn start_calls(&self) -> usize {
        lock(&self.state).start_calls
    }

    pub fn stop_calls(&self) -> usize {
        lock(&self.state).stop_calls
    }

    pub fn torch_enabled(&self) -> bool {
        lock(&self.state).torch
    }
}

#[async_trait]
impl CameraBackend for MockCamera {
    async fn start(
        &self,
        device_id: &str,
        _config: &ScanConfig,
        sink: StreamSink,
    ) -> Result<(), CameraError> {
        let delay = {
            let mut state = lock(&self.state);
            state.start_calls += 1;
            state.start_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if let Some(error) = state.fail_devices.get(device_id) {
            return Err(error.clone());
        }
        if !state.devices.is_empty() && !state.devices.iter().any(|d| d.id == device_id) {
            return Err(CameraError::InitializationError(format!(
                "camera {} not found",
                device_id
            )));
        }

        state.open_handles += 1;
        state.max_open_handles = state.max_open_handles.max(state.open_handles);
        state.active_device = Some(device_id.to_string());
        state.sink = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CameraError> {
        let delay = {
            let mut state = lock(&self.state);
            state.stop_calls += 1;
            state.stop_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if state.active_device.take().is_some() {
            state.open_handles -= 1;
        }
        state.sink = None;
        state.torch = false;
        Ok(())
    }

    async fn apply_constraint(&self, constraint: Constraint) -> Result<bool, CameraError> {
        let delay = lock(&self.state).constraint_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        match constraint {
            Constraint::Torch(_) if !state.torch_supported => Ok(false),
            Constraint::Torch(_) if state.active_device.is_none() => Err(
                CameraError::ControlError("no open stream".to_string()),
            ),
            Constraint::Torch(enabled) => {
                state.torch = enabled;
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl DeviceEnumerator for MockCamera {
    async fn list_devices(&self) -> Result<Vec<CameraDevice>, EnumerationError> {
        let state = lock(&self.state);
        match &state.enumeration_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.devices.clone()),
        }
    }
}
