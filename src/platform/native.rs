//! Camera backend over `nokhwa`.
//!
//! Each acquisition runs on a dedicated capture thread that owns the
//! `nokhwa::Camera`, decodes the centred scan region of every frame and
//! pushes the outcome into the stream sink. Release sets the stop flag and
//! joins the thread.

use super::{CameraBackend, DeviceEnumerator, StreamSink};
use crate::decode::{crop_aspect, crop_center, DecodeCapability};
use crate::errors::{CameraError, EnumerationError};
use crate::types::{CameraDevice, Constraint, DecodeEvent, Frame, ScanConfig, StreamEvent};
use async_trait::async_trait;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

struct Worker {
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct NativeCamera {
    decoder: Arc<dyn DecodeCapability>,
    worker: Mutex<Option<Worker>>,
}

impl NativeCamera {
    pub fn new(decoder: Arc<dyn DecodeCapability>) -> Self {
        Self {
            decoder,
            worker: Mutex::new(None),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn join(worker: Worker) -> Result<(), CameraError> {
        worker.stop_flag.store(true, Ordering::Relaxed);
        tokio::task::spawn_blocking(move || worker.handle.join())
            .await
            .map_err(|e| CameraError::StreamError(format!("join task failed: {}", e)))?
            .map_err(|_| CameraError::StreamError("capture thread panicked".to_string()))
    }
}

#[async_trait]
impl CameraBackend for NativeCamera {
    async fn start(
        &self,
        device_id: &str,
        config: &ScanConfig,
        sink: StreamSink,
    ) -> Result<(), CameraError> {
        let previous = self.worker().take();
        if let Some(previous) = previous {
            log::warn!("Capture thread still running at start; releasing it first");
            Self::join(previous).await?;
        }

        if config.experimental_detector_hint {
            log::debug!("No platform barcode detector through nokhwa; decoding with rqrr");
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let capture = CaptureLoop {
            device_id: device_id.to_string(),
            config: config.clone(),
            decoder: self.decoder.clone(),
            sink,
            stop_flag: stop_flag.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("crabscan-capture".to_string())
            .spawn(move || capture.run(ready_tx))
            .map_err(|e| CameraError::InitializationError(format!("spawn failed: {}", e)))?;

        // Stored before awaiting so a dropped start still gets joined by stop().
        *self.worker() = Some(Worker { stop_flag, handle });

        let ready = ready_rx.await.unwrap_or_else(|_| {
            Err(CameraError::InitializationError(
                "capture thread exited before opening the camera".to_string(),
            ))
        });

        if let Err(e) = ready {
            let worker = self.worker().take();
            if let Some(worker) = worker {
                let _ = Self::join(worker).await;
            }
            return Err(e);
        }

        log::info!("Camera {} streaming", device_id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CameraError> {
        let worker = self.worker().take();
        match worker {
            Some(worker) => Self::join(worker).await,
            None => Ok(()),
        }
    }

    async fn apply_constraint(&self, constraint: Constraint) -> Result<bool, CameraError> {
        log::debug!("Constraint {} not available through nokhwa", constraint.name());
        Ok(false)
    }
}

#[async_trait]
impl DeviceEnumerator for NativeCamera {
    async fn list_devices(&self) -> Result<Vec<CameraDevice>, EnumerationError> {
        let cameras = tokio::task::spawn_blocking(|| query(ApiBackend::Auto))
            .await
            .map_err(|e| EnumerationError::Backend(e.to_string()))?
            .map_err(|e| EnumerationError::from(classify(&e.to_string(), "")))?;

        Ok(cameras
            .into_iter()
            .map(|info| CameraDevice::new(info.index().to_string(), info.human_name()))
            .collect())
    }
}

struct CaptureLoop {
    device_id: String,
    config: ScanConfig,
    decoder: Arc<dyn DecodeCapability>,
    sink: StreamSink,
    stop_flag: Arc<AtomicBool>,
}

impl CaptureLoop {
    fn run(self, ready: oneshot::Sender<Result<(), CameraError>>) {
        let mut camera = match self.open() {
            Ok(camera) => camera,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        if ready.send(Ok(())).is_err() {
            // Nobody waiting any more: the acquisition was abandoned.
            let _ = camera.stop_stream();
            return;
        }

        let interval = self.config.frame_interval();
        while !self.stop_flag.load(Ordering::Relaxed) {
            let frame = match self.next_frame(&mut camera) {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("Camera {} stream failed: {}", self.device_id, e);
                    let _ = self.sink.send(StreamEvent::Fault(e.to_string()));
                    break;
                }
            };

            let framed = crop_aspect(&frame, self.config.aspect_ratio);
            let region = crop_center(&framed, self.config.scan_region);
            let event = match self.decoder.decode_frame(&region) {
                Ok(Some(text)) => StreamEvent::Decoded(DecodeEvent::new(text, &self.device_id)),
                Ok(None) => StreamEvent::DecodeFailure("no code in frame".to_string()),
                Err(e) => StreamEvent::DecodeFailure(e.to_string()),
            };
            if self.sink.send(event).is_err() {
                break;
            }

            std::thread::sleep(interval);
        }

        if let Err(e) = camera.stop_stream() {
            log::warn!("Failed to stop camera {} stream: {}", self.device_id, e);
        }
        log::debug!("Capture thread for camera {} exiting", self.device_id);
    }

    fn open(&self) -> Result<Camera, CameraError> {
        let index = match self.device_id.parse::<u32>() {
            Ok(index) => CameraIndex::Index(index),
            Err(_) => CameraIndex::String(self.device_id.clone()),
        };
        // nokhwa picks the native format; aspect ratio is applied by cropping frames.
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);

        let mut camera = Camera::new(index, requested)
            .map_err(|e| classify(&e.to_string(), &self.device_id))?;
        camera
            .open_stream()
            .map_err(|e| classify(&e.to_string(), &self.device_id))?;
        Ok(camera)
    }

    fn next_frame(&self, camera: &mut Camera) -> Result<Frame, CameraError> {
        let buffer = camera
            .frame()
            .map_err(|e| CameraError::CaptureError(format!("Failed to capture frame: {}", e)))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureError(format!("Failed to decode frame: {}", e)))?;

        Ok(Frame {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
            device_id: self.device_id.clone(),
        })
    }
}

/// Map a nokhwa error message onto the camera error taxonomy.
fn classify(message: &str, device_id: &str) -> CameraError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CameraError::PermissionDenied(message.to_string())
    } else if lower.contains("busy") || lower.contains("in use") {
        CameraError::DeviceBusy(message.to_string())
    } else if lower.contains("not found")
        || lower.contains("could not find")
        || lower.contains("no such device")
    {
        CameraError::InitializationError(format!("camera {} not found", device_id))
    } else {
        CameraError::InitializationError(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert!(matches!(
            classify("Permission denied (os error 13)", "0"),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify("Device or resource busy", "0"),
            CameraError::DeviceBusy(_)
        ));
        assert_eq!(
            classify("No such device", "3"),
            CameraError::InitializationError("camera 3 not found".to_string())
        );
    }

    #[tokio::test]
    async fn test_stop_without_worker() {
        let camera = NativeCamera::new(Arc::new(crate::decode::RqrrDecoder::new()));
        assert!(camera.stop().await.is_ok());
        assert_eq!(camera.apply_constraint(Constraint::Torch(true)).await, Ok(false));
    }
}
