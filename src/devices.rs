//! Camera enumeration with local recovery.

use crate::platform::DeviceEnumerator;
use crate::types::CameraDevice;

/// List cameras, treating any enumeration failure as "no cameras".
///
/// Permission problems and missing backends are logged; the caller simply
/// sees an empty list and has nothing to select.
pub async fn list_devices(enumerator: &dyn DeviceEnumerator) -> Vec<CameraDevice> {
    match enumerator.list_devices().await {
        Ok(devices) => {
            log::info!("Found {} cameras", devices.len());
            for device in &devices {
                log::debug!("Camera: {} - {}", device.id, device.label);
            }
            devices
        }
        Err(e) => {
            log::warn!("Camera enumeration failed, presenting empty list: {}", e);
            Vec::new()
        }
    }
}

/// The camera selected when the list is first shown: the first one listed.
pub fn default_device(devices: &[CameraDevice]) -> Option<&CameraDevice> {
    devices.first()
}
