//! Test doubles for driving a scan session without hardware or network.
//!
//! [`MockCamera`] stands in for both the camera backend and the device
//! enumerator, [`StaticDecoder`] maps image bytes to fixed text, and
//! [`RecordingDispatcher`] keeps every notification it was asked to send.

pub mod camera;
pub mod doubles;

pub use camera::MockCamera;
pub use doubles::{RecordingDispatcher, StaticDecoder};

use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
