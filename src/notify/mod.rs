//! Arrival notifications.
//!
//! The controller builds one [`NotificationRequest`] per successful scan and
//! hands it to a [`NotificationDispatcher`] without waiting for the outcome.
//! Outcomes are published as [`DispatchReport`]s.

pub mod http;
pub mod payload;

pub use http::HttpDispatcher;
pub use payload::{classify, ScanPayload};

use crate::config::NotificationConfig;
use crate::errors::DispatchError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

/// A fully resolved message, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Decoded text that triggered the notification
    pub payload: String,
}

impl NotificationRequest {
    /// Resolve configured defaults against a decoded payload.
    pub fn compose(config: &NotificationConfig, decoded: &str, sent_at: DateTime<Local>) -> Self {
        let recipient = match classify(decoded) {
            ScanPayload::Email(address) if config.recipient_from_payload => address,
            _ => config.default_recipient.clone(),
        };

        let body = config
            .body_template
            .replace("{timestamp}", &format_timestamp(sent_at))
            .replace("{payload}", decoded);

        Self {
            recipient,
            subject: config.default_subject.clone(),
            body,
            payload: decoded.to_string(),
        }
    }
}

/// `10/17/2026, 8:05:09 AM` style local time.
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

/// Successful send. `info` is whatever the endpoint reported.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchReceipt {
    pub info: Option<serde_json::Value>,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<DispatchReceipt, DispatchError>;
}

/// Outcome of one fire-and-forget dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub session_id: Option<Uuid>,
    pub request: NotificationRequest,
    pub outcome: Result<DispatchReceipt, DispatchError>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Dispatcher that only logs. Useful when no endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<DispatchReceipt, DispatchError> {
        log::info!(
            "Notification to {} ({}): {}",
            request.recipient,
            request.subject,
            request.body
        );
        Ok(DispatchReceipt::default())
    }
}
