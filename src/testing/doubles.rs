use super::lock;
use crate::decode::DecodeCapability;
use crate::errors::{DecodeError, DispatchError};
use crate::notify::{DispatchReceipt, NotificationDispatcher, NotificationRequest};
use crate::types::Frame;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Decoder that answers from a fixed table of image bytes.
#[derive(Debug, Default)]
pub struct StaticDecoder {
    codes: HashMap<Vec<u8>, String>,
    unreadable: Vec<Vec<u8>>,
}

impl StaticDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `image` decodes to `text`.
    pub fn with_code(mut self, image: &[u8], text: &str) -> Self {
        self.codes.insert(image.to_vec(), text.to_string());
        self
    }

    /// `image` fails with [`DecodeError::InvalidImage`].
    pub fn with_unreadable(mut self, image: &[u8]) -> Self {
        self.unreadable.push(image.to_vec());
        self
    }
}

#[async_trait]
impl DecodeCapability for StaticDecoder {
    fn decode_frame(&self, frame: &Frame) -> Result<Option<String>, DecodeError> {
        Ok(self.codes.get(&frame.data).cloned())
    }

    async fn decode_image(&self, buffer: Bytes) -> Result<Option<String>, DecodeError> {
        if self.unreadable.iter().any(|bad| bad.as_slice() == buffer.as_ref()) {
            return Err(DecodeError::InvalidImage("unsupported format".to_string()));
        }
        Ok(self.codes.get(buffer.as_ref()).cloned())
    }
}

/// Dispatcher that records every request instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    requests: Mutex<Vec<NotificationRequest>>,
    failure: Option<DispatchError>,
    delay: Duration,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the request, then fail with `error`.
    pub fn failing(mut self, error: DispatchError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Hold every dispatch for `delay` before recording it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<NotificationRequest> {
        lock(&self.requests).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Poll until at least `count` requests arrived or `timeout` passed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<DispatchReceipt, DispatchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        lock(&self.requests).push(request.clone());
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(DispatchReceipt::default()),
        }
    }
}
