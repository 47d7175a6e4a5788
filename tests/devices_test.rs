//! Device enumeration and default selection
//!
//! Run with: cargo test --test devices_test

use crabscan::errors::EnumerationError;
use crabscan::testing::{MockCamera, RecordingDispatcher, StaticDecoder};
use crabscan::{list_devices, AcquisitionState, CameraDevice, ScanController};
use std::sync::Arc;

#[cfg(test)]
mod device_tests {
    use super::*;

    #[test]
    fn test_label_fallback() {
        let device = CameraDevice::new("2", "  ");
        assert_eq!(device.label, "Camera 2");
        assert_eq!(CameraDevice::new("2", "USB Cam").label, "USB Cam");
    }

    #[tokio::test]
    async fn test_permission_denied_lists_nothing() {
        let camera = MockCamera::new()
            .with_devices(vec![CameraDevice::new("0", "Front")])
            .with_enumeration_error(EnumerationError::PermissionDenied("blocked".to_string()));

        assert!(list_devices(&camera).await.is_empty());
    }

    #[tokio::test]
    async fn test_enumerate_then_start_default() {
        let camera = Arc::new(MockCamera::new().with_devices(vec![
            CameraDevice::new("usb-1", "Document camera"),
            CameraDevice::new("usb-2", ""),
        ]));
        let controller = ScanController::builder(
            camera.clone(),
            Arc::new(StaticDecoder::new()),
            Arc::new(RecordingDispatcher::new()),
        )
        .build();

        let devices = list_devices(camera.as_ref()).await;
        assert_eq!(devices[1].label, "Camera usb-2");

        let selected = controller.start_default(&devices).await.unwrap();
        assert_eq!(selected.unwrap().id, "usb-1");
        assert_eq!(controller.state(), AcquisitionState::Active);
        assert_eq!(camera.active_device().as_deref(), Some("usb-1"));
    }

    #[tokio::test]
    async fn test_failed_enumeration_keeps_controller_idle() {
        let camera = Arc::new(
            MockCamera::new().with_enumeration_error(EnumerationError::Backend("no backend".to_string())),
        );
        let controller = ScanController::builder(
            camera.clone(),
            Arc::new(StaticDecoder::new()),
            Arc::new(RecordingDispatcher::new()),
        )
        .build();

        let devices = list_devices(camera.as_ref()).await;
        assert_eq!(controller.start_default(&devices).await, Ok(None));
        assert_eq!(controller.state(), AcquisitionState::Idle);
        assert_eq!(camera.start_calls(), 0);
    }
}
