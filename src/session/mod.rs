//! Scan session lifecycle.
//!
//! One [`ScanController`] owns one camera acquisition at a time and moves it
//! through `Idle -> Acquiring -> Active -> Stopping -> Idle`, with `Error`
//! reachable from acquisition or stream faults.

pub mod controller;
pub mod feedback;

pub use controller::{ScanController, ScanControllerBuilder};
pub use feedback::{Feedback, LogFeedback, NoFeedback};
