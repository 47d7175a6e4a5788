use crate::config::FeedbackConfig;
use std::sync::Arc;
use std::time::Duration;

/// Side effect fired once per successful decode (haptics, beep, LED).
///
/// Failures are logged by the controller and otherwise ignored.
pub trait Feedback: Send + Sync {
    fn pulse(&self, decoded: &str) -> Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl Feedback for NoFeedback {
    fn pulse(&self, _decoded: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Stand-in for a vibration motor on hosts without one.
#[derive(Debug, Clone, Copy)]
pub struct LogFeedback {
    pub vibrate: Duration,
}

impl Feedback for LogFeedback {
    fn pulse(&self, decoded: &str) -> Result<(), String> {
        log::info!(
            "Feedback pulse ({} ms) for {} byte payload",
            self.vibrate.as_millis(),
            decoded.len()
        );
        Ok(())
    }
}

pub fn from_config(config: &FeedbackConfig) -> Arc<dyn Feedback> {
    if config.enabled && config.vibrate_ms > 0 {
        Arc::new(LogFeedback {
            vibrate: Duration::from_millis(config.vibrate_ms),
        })
    } else {
        Arc::new(NoFeedback)
    }
}
