use super::{DispatchReceipt, NotificationDispatcher, NotificationRequest};
use crate::config::NotificationConfig;
use crate::errors::DispatchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ERROR_LEN: usize = 512;

/// Body accepted by the send-message endpoint. Absent fields get server defaults.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    success: bool,
    #[serde(default)]
    info: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts notifications as JSON to an HTTP send-message endpoint.
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
    secrets: Vec<String>,
}

impl HttpDispatcher {
    pub fn from_config(config: &NotificationConfig) -> Result<Self, DispatchError> {
        let auth_token = config
            .auth_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty());

        let mut secrets: Vec<String> = config
            .redact_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .collect();
        secrets.extend(auth_token.clone());

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms));
        if config.allow_insecure_tls {
            log::warn!(
                "TLS certificate validation is DISABLED for notification endpoint {}",
                config.endpoint
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            auth_token,
            secrets,
        })
    }

    /// Add a value that must never leak into error messages.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets.push(secret.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn scrub(&self, message: &str) -> String {
        let mut scrubbed = redact(message, &self.secrets);
        if scrubbed.len() > MAX_ERROR_LEN {
            let mut cut = MAX_ERROR_LEN;
            while !scrubbed.is_char_boundary(cut) {
                cut -= 1;
            }
            scrubbed.truncate(cut);
            scrubbed.push_str("...");
        }
        scrubbed
    }
}

#[async_trait]
impl NotificationDispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<DispatchReceipt, DispatchError> {
        let body = SendMessage {
            to: Some(&request.recipient),
            subject: Some(&request.subject),
            text: Some(&request.body),
        };

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.auth_token {
            http = http.bearer_auth(token);
        }

        let response = http
            .send()
            .await
            .map_err(|e| DispatchError::Transport(self.scrub(&e.to_string())))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DispatchError::Transport(self.scrub(&e.to_string())))?;
        let parsed = serde_json::from_str::<SendResponse>(&text).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|r| r.error)
                .unwrap_or_else(|| text.clone());
            if status.is_server_error() {
                return Err(DispatchError::Transport(
                    self.scrub(&format!("{}: {}", status.as_u16(), message)),
                ));
            }
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message: self.scrub(&message),
            });
        }

        let parsed = parsed.ok_or_else(|| {
            DispatchError::InvalidResponse(self.scrub(&format!("unexpected body: {}", text)))
        })?;
        if !parsed.success {
            let message = parsed
                .error
                .unwrap_or_else(|| "endpoint reported failure".to_string());
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message: self.scrub(&message),
            });
        }

        log::debug!("Notification accepted by {}", self.endpoint);
        Ok(DispatchReceipt { info: parsed.info })
    }
}

/// Replace every occurrence of each non-empty secret with `***`.
pub fn redact(message: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(message.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_replaces_all_secrets() {
        let secrets = vec!["user@gmail.com".to_string(), "hunter2".to_string()];
        let message = "auth failed for user@gmail.com with hunter2hunter2";
        assert_eq!(redact(message, &secrets), "auth failed for *** with ******");
    }

    #[test]
    fn test_redact_ignores_empty_secret() {
        let secrets = vec![String::new()];
        assert_eq!(redact("unchanged", &secrets), "unchanged");
    }

    #[test]
    fn test_send_message_omits_absent_fields() {
        let body = SendMessage {
            to: None,
            subject: Some("S"),
            text: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"subject":"S"}"#);
    }

    #[test]
    fn test_scrub_truncates_long_messages() {
        let dispatcher = HttpDispatcher::from_config(&NotificationConfig::default())
            .unwrap()
            .with_secret("s3cret");
        let long = format!("s3cret {}", "x".repeat(2000));
        let scrubbed = dispatcher.scrub(&long);
        assert!(scrubbed.starts_with("*** "));
        assert!(scrubbed.ends_with("..."));
        assert!(scrubbed.len() <= MAX_ERROR_LEN + 3);
    }
}
