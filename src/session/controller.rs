use crate::config::{CrabScanConfig, NotificationConfig};
use crate::decode::DecodeCapability;
use crate::devices::default_device;
use crate::errors::AcquisitionError;
use crate::notify::{DispatchReport, NotificationDispatcher, NotificationRequest};
use crate::platform::{CameraBackend, StreamReceiver};
use crate::session::feedback::{self, Feedback, NoFeedback};
use crate::types::{
    AcquisitionState, CameraDevice, Constraint, ConstraintOutcome, DecodeEvent, DecodeOutcome,
    ScanConfig, ScanSnapshot, StaticScanOutcome, StreamEvent,
};
use bytes::Bytes;
use chrono::Local;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, mpsc, watch, Notify};
use uuid::Uuid;

const REPORT_CAPACITY: usize = 16;

struct SessionCore {
    state: AcquisitionState,
    session_id: Option<Uuid>,
    active_device_id: Option<String>,
    /// Device and config of the most recent start, reused by `restart`.
    selection: Option<(String, ScanConfig)>,
    torch_enabled: bool,
    last_result: Option<String>,
    last_error: Option<String>,
    cancel: Option<Arc<Notify>>,
}

impl SessionCore {
    fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            session_id: self.session_id,
            active_device_id: self.active_device_id.clone(),
            state: self.state,
            torch_enabled: self.torch_enabled,
            last_result: self.last_result.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

struct Inner {
    backend: Arc<dyn CameraBackend>,
    decoder: Arc<dyn DecodeCapability>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    feedback: Arc<dyn Feedback>,
    notification: NotificationConfig,
    scan_config: ScanConfig,
    core: Mutex<SessionCore>,
    /// Serializes every camera-touching operation.
    ops: tokio::sync::Mutex<()>,
    snapshots: watch::Sender<ScanSnapshot>,
    reports: broadcast::Sender<DispatchReport>,
}

/// Owns the single camera acquisition of one presentation context.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct ScanController {
    inner: Arc<Inner>,
}

pub struct ScanControllerBuilder {
    backend: Arc<dyn CameraBackend>,
    decoder: Arc<dyn DecodeCapability>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    feedback: Arc<dyn Feedback>,
    notification: NotificationConfig,
    scan_config: ScanConfig,
}

impl ScanControllerBuilder {
    pub fn feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn notification(mut self, notification: NotificationConfig) -> Self {
        self.notification = notification;
        self
    }

    /// Config used by `select_device`.
    pub fn scan_config(mut self, scan_config: ScanConfig) -> Self {
        self.scan_config = scan_config;
        self
    }

    pub fn build(self) -> ScanController {
        let core = SessionCore {
            state: AcquisitionState::Idle,
            session_id: None,
            active_device_id: None,
            selection: None,
            torch_enabled: false,
            last_result: None,
            last_error: None,
            cancel: None,
        };
        let (snapshots, _) = watch::channel(core.snapshot());
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);

        ScanController {
            inner: Arc::new(Inner {
                backend: self.backend,
                decoder: self.decoder,
                dispatcher: self.dispatcher,
                feedback: self.feedback,
                notification: self.notification,
                scan_config: self.scan_config,
                core: Mutex::new(core),
                ops: tokio::sync::Mutex::new(()),
                snapshots,
                reports,
            }),
        }
    }
}

enum Acquired {
    Started,
    Failed(AcquisitionError),
    Cancelled,
}

impl ScanController {
    pub fn builder(
        backend: Arc<dyn CameraBackend>,
        decoder: Arc<dyn DecodeCapability>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> ScanControllerBuilder {
        ScanControllerBuilder {
            backend,
            decoder,
            dispatcher,
            feedback: Arc::new(NoFeedback),
            notification: NotificationConfig::default(),
            scan_config: ScanConfig::default(),
        }
    }

    pub fn from_config(
        config: &CrabScanConfig,
        backend: Arc<dyn CameraBackend>,
        decoder: Arc<dyn DecodeCapability>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self::builder(backend, decoder, dispatcher)
            .feedback(feedback::from_config(&config.feedback))
            .notification(config.notification.clone())
            .scan_config(config.scanner.clone())
            .build()
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        self.core().snapshot()
    }

    pub fn state(&self) -> AcquisitionState {
        self.core().state
    }

    pub fn last_result(&self) -> Option<String> {
        self.core().last_result.clone()
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Receive the outcome of every notification dispatch.
    pub fn dispatch_reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.inner.reports.subscribe()
    }

    /// Start scanning with an explicit device and config. Only valid while idle.
    pub async fn start(&self, device_id: &str, config: ScanConfig) -> Result<(), AcquisitionError> {
        let ops = self.inner.ops.lock().await;
        self.start_locked(&ops, device_id, config).await
    }

    /// Switch to `device_id`: release whatever is held, then acquire the new device.
    pub async fn select_device(&self, device_id: &str) -> Result<(), AcquisitionError> {
        self.begin_stop();
        let ops = self.inner.ops.lock().await;
        self.release_locked(&ops).await;
        let config = self.inner.scan_config.clone();
        self.start_locked(&ops, device_id, config).await
    }

    /// Select the first listed camera. An empty list leaves the session idle.
    pub async fn start_default(
        &self,
        devices: &[CameraDevice],
    ) -> Result<Option<CameraDevice>, AcquisitionError> {
        match default_device(devices) {
            Some(device) => {
                self.select_device(&device.id).await?;
                Ok(Some(device.clone()))
            }
            None => {
                log::info!("No cameras available; scan session stays idle");
                Ok(None)
            }
        }
    }

    /// Release the camera. A no-op when already idle.
    pub async fn stop(&self) {
        self.begin_stop();
        let ops = self.inner.ops.lock().await;
        self.release_locked(&ops).await;
    }

    /// Stop, clear the last result, and start again on the same device and config.
    pub async fn restart(&self) -> Result<(), AcquisitionError> {
        self.begin_stop();
        let ops = self.inner.ops.lock().await;
        self.release_locked(&ops).await;

        let selection = {
            let mut core = self.core();
            core.last_result = None;
            self.publish(&core);
            core.selection.clone()
        };

        match selection {
            Some((device_id, config)) => self.start_locked(&ops, &device_id, config).await,
            None => {
                log::debug!("Restart requested with no camera selected");
                Ok(())
            }
        }
    }

    pub async fn set_torch(&self, enabled: bool) -> ConstraintOutcome {
        let ops = self.inner.ops.lock().await;
        self.set_torch_locked(&ops, enabled).await
    }

    /// Flip the torch. The current value is read under the ops lock so
    /// concurrent toggles apply one after the other.
    pub async fn toggle_torch(&self) -> ConstraintOutcome {
        let ops = self.inner.ops.lock().await;
        let target = !self.core().torch_enabled;
        self.set_torch_locked(&ops, target).await
    }

    /// Handle a decode result pushed by the live stream.
    ///
    /// Only the first success of an active session is accepted; it records
    /// the result, fires the notification and stops the camera.
    pub async fn on_decode_event(&self, event: DecodeEvent) -> DecodeOutcome {
        self.accept_decode(None, event).await
    }

    /// Decode an uploaded image. Any live stream is stopped first.
    pub async fn scan_static_image(&self, image: Bytes) -> StaticScanOutcome {
        self.begin_stop();
        let ops = self.inner.ops.lock().await;
        self.release_locked(&ops).await;

        {
            let mut core = self.core();
            core.last_result = None;
            self.publish(&core);
        }

        let decoded = match self.inner.decoder.decode_image(image).await {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Uploaded image could not be decoded: {}", e);
                None
            }
        };

        let Some(text) = decoded else {
            log::info!("No QR code found in uploaded image");
            return StaticScanOutcome::NoMatch;
        };

        let session_id = Uuid::new_v4();
        {
            let mut core = self.core();
            core.session_id = Some(session_id);
            core.last_result = Some(text.clone());
            self.publish(&core);
        }
        log::info!("Decoded uploaded image (session {})", session_id);

        self.notify(Some(session_id), &text);
        drop(ops);
        self.pulse(&text);
        StaticScanOutcome::Decoded(text)
    }

    fn core(&self) -> MutexGuard<'_, SessionCore> {
        // The core is plain data; a panic elsewhere cannot leave it half-written.
        self.inner
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, core: &SessionCore) {
        self.inner.snapshots.send_replace(core.snapshot());
    }

    /// Mark the current acquisition as stopping so no further decode is accepted,
    /// and abort an acquisition still in flight.
    fn begin_stop(&self) {
        let mut core = self.core();
        match core.state {
            AcquisitionState::Idle | AcquisitionState::Stopping => {}
            AcquisitionState::Acquiring => {
                if let Some(cancel) = core.cancel.take() {
                    cancel.notify_one();
                }
                core.state = AcquisitionState::Stopping;
                self.publish(&core);
            }
            AcquisitionState::Active | AcquisitionState::Error => {
                core.state = AcquisitionState::Stopping;
                self.publish(&core);
            }
        }
    }

    async fn set_torch_locked(
        &self,
        _ops: &tokio::sync::MutexGuard<'_, ()>,
        enabled: bool,
    ) -> ConstraintOutcome {
        let state = self.core().state;
        if state != AcquisitionState::Active {
            log::warn!("Torch request ignored while session is {}", state);
            return ConstraintOutcome::Unsupported(format!("no active scan (session is {})", state));
        }

        match self.inner.backend.apply_constraint(Constraint::Torch(enabled)).await {
            Ok(true) => {
                let mut core = self.core();
                if core.state == AcquisitionState::Active {
                    core.torch_enabled = enabled;
                    self.publish(&core);
                }
                ConstraintOutcome::Applied
            }
            Ok(false) => {
                log::warn!("Torch not supported on this device");
                ConstraintOutcome::Unsupported("device does not support torch".to_string())
            }
            Err(e) => {
                log::warn!("Torch not applied: {}", e);
                ConstraintOutcome::Unsupported(e.to_string())
            }
        }
    }

    async fn release_locked(&self, _ops: &tokio::sync::MutexGuard<'_, ()>) {
        let session_id = {
            let mut core = self.core();
            if core.state == AcquisitionState::Idle {
                return;
            }
            core.state = AcquisitionState::Stopping;
            self.publish(&core);
            core.session_id
        };

        if let Err(e) = self.inner.backend.stop().await {
            log::warn!("Ignoring error while releasing camera: {}", e);
        }

        let mut core = self.core();
        core.state = AcquisitionState::Idle;
        core.active_device_id = None;
        core.torch_enabled = false;
        core.cancel = None;
        self.publish(&core);
        log::info!("Camera released (session {:?})", session_id);
    }

    async fn start_locked(
        &self,
        _ops: &tokio::sync::MutexGuard<'_, ()>,
        device_id: &str,
        config: ScanConfig,
    ) -> Result<(), AcquisitionError> {
        let session_id = Uuid::new_v4();
        let cancel = Arc::new(Notify::new());
        {
            let mut core = self.core();
            if core.state != AcquisitionState::Idle {
                return Err(AcquisitionError::InvalidState(core.state.to_string()));
            }
            core.session_id = Some(session_id);
            core.active_device_id = Some(device_id.to_string());
            core.selection = Some((device_id.to_string(), config.clone()));
            core.torch_enabled = false;
            core.last_error = None;

            if let Err(reason) = config.validate() {
                let error = AcquisitionError::ConfigRejected(reason);
                log::error!("Refusing to start camera {}: {}", device_id, error);
                core.state = AcquisitionState::Error;
                core.last_error = Some(error.to_string());
                self.publish(&core);
                return Err(error);
            }

            core.state = AcquisitionState::Acquiring;
            core.cancel = Some(cancel.clone());
            self.publish(&core);
        }

        log::info!("Acquiring camera {} (session {})", device_id, session_id);
        let (sink, events) = mpsc::unbounded_channel();
        let result = tokio::select! {
            result = self.inner.backend.start(device_id, &config, sink) => Some(result),
            _ = cancel.notified() => None,
        };

        let acquired = {
            let mut core = self.core();
            let current = core.state == AcquisitionState::Acquiring
                && core.session_id == Some(session_id);
            match result {
                Some(Ok(())) if current => {
                    core.state = AcquisitionState::Active;
                    core.cancel = None;
                    self.publish(&core);
                    Acquired::Started
                }
                Some(Err(e)) if current => {
                    let error = AcquisitionError::from_camera(device_id, e);
                    core.state = AcquisitionState::Error;
                    core.cancel = None;
                    core.last_error = Some(error.to_string());
                    self.publish(&core);
                    Acquired::Failed(error)
                }
                _ => Acquired::Cancelled,
            }
        };

        match acquired {
            Acquired::Started => {
                log::info!("Scanning on camera {} (session {})", device_id, session_id);
                tokio::spawn(pump(
                    Arc::downgrade(&self.inner),
                    session_id,
                    events,
                    self.subscribe(),
                ));
                Ok(())
            }
            Acquired::Failed(error) => {
                log::error!("Failed to start camera {}: {}", device_id, error);
                if let Err(e) = self.inner.backend.stop().await {
                    log::debug!("Cleanup after failed start: {}", e);
                }
                Err(error)
            }
            Acquired::Cancelled => {
                log::info!("Acquisition of camera {} cancelled", device_id);
                if let Err(e) = self.inner.backend.stop().await {
                    log::warn!("Ignoring error while releasing cancelled camera: {}", e);
                }
                let mut core = self.core();
                if core.session_id == Some(session_id) {
                    core.state = AcquisitionState::Idle;
                    core.active_device_id = None;
                    core.cancel = None;
                    self.publish(&core);
                }
                Err(AcquisitionError::Cancelled)
            }
        }
    }

    async fn accept_decode(&self, expected: Option<Uuid>, event: DecodeEvent) -> DecodeOutcome {
        let session_id = {
            let mut core = self.core();
            let current = core.state == AcquisitionState::Active
                && core.active_device_id.as_deref() == Some(event.source_device_id.as_str())
                && expected.map_or(true, |id| core.session_id == Some(id));
            if !current {
                log::debug!(
                    "Discarding decode from camera {} while session is {}",
                    event.source_device_id,
                    core.state
                );
                return DecodeOutcome::Discarded;
            }
            // Leaving Active here is what makes every later event a discard.
            core.state = AcquisitionState::Stopping;
            core.last_result = Some(event.text.clone());
            self.publish(&core);
            core.session_id
        };

        log::info!(
            "Decoded QR code from camera {} (session {:?})",
            event.source_device_id,
            session_id
        );
        self.notify(session_id, &event.text);

        let ops = self.inner.ops.lock().await;
        let still_ours = {
            let core = self.core();
            core.session_id == session_id && core.state == AcquisitionState::Stopping
        };
        if still_ours {
            self.release_locked(&ops).await;
        }
        drop(ops);

        self.pulse(&event.text);
        DecodeOutcome::Accepted
    }

    async fn fail_stream(&self, session_id: Uuid, reason: String) {
        {
            let mut core = self.core();
            if core.state != AcquisitionState::Active || core.session_id != Some(session_id) {
                return;
            }
            core.state = AcquisitionState::Error;
            core.torch_enabled = false;
            core.last_error = Some(reason.clone());
            self.publish(&core);
        }
        log::error!("Camera stream failed (session {}): {}", session_id, reason);

        let _ops = self.inner.ops.lock().await;
        let still_ours = {
            let core = self.core();
            core.session_id == Some(session_id) && core.state == AcquisitionState::Error
        };
        if still_ours {
            if let Err(e) = self.inner.backend.stop().await {
                log::warn!("Ignoring error while releasing failed camera: {}", e);
            }
        }
    }

    /// Fire-and-forget dispatch; the outcome goes to the report channel.
    fn notify(&self, session_id: Option<Uuid>, decoded: &str) {
        let request = NotificationRequest::compose(&self.inner.notification, decoded, Local::now());
        let dispatcher = self.inner.dispatcher.clone();
        let reports = self.inner.reports.clone();

        tokio::spawn(async move {
            let outcome = dispatcher.dispatch(&request).await;
            match &outcome {
                Ok(_) => log::info!("Arrival notification sent to {}", request.recipient),
                Err(e) => log::error!("Arrival notification failed: {}", e),
            }
            let _ = reports.send(DispatchReport {
                session_id,
                request,
                outcome,
            });
        });
    }

    fn pulse(&self, decoded: &str) {
        if let Err(e) = self.inner.feedback.pulse(decoded) {
            log::debug!("Feedback failed: {}", e);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let core = self
            .core
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if core.state == AcquisitionState::Idle {
            return;
        }
        if let Some(cancel) = core.cancel.take() {
            cancel.notify_one();
        }

        log::info!(
            "Scan controller dropped while {}; releasing camera (session {:?})",
            core.state,
            core.session_id
        );
        let backend = self.backend.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = backend.stop().await {
                        log::warn!("Failed to release camera after controller drop: {}", e);
                    }
                });
            }
            Err(_) => {
                log::warn!("Scan controller dropped outside a tokio runtime; camera not released");
            }
        }
    }
}

/// Drains one acquisition's stream until it ends or the session moves on.
///
/// Holds the controller weakly so an abandoned controller can still drop.
async fn pump(
    weak: Weak<Inner>,
    session_id: Uuid,
    mut events: StreamReceiver,
    mut snapshots: watch::Receiver<ScanSnapshot>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(inner) = weak.upgrade() else { break };
                let controller = ScanController { inner };
                match event {
                    StreamEvent::Decoded(event) => {
                        controller.accept_decode(Some(session_id), event).await;
                    }
                    StreamEvent::DecodeFailure(diagnostic) => {
                        log::trace!("No code in frame: {}", diagnostic);
                    }
                    StreamEvent::Fault(reason) => {
                        controller.fail_stream(session_id, reason).await;
                        break;
                    }
                }
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update();
                if snapshot.session_id != Some(session_id)
                    || snapshot.state == AcquisitionState::Idle
                {
                    break;
                }
            }
        }
    }
    log::debug!("Stream pump for session {} finished", session_id);
}
