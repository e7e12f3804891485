//! Delivery providers for the email channel.

use crate::models::DispatchMessage;
use async_trait::async_trait;
use serde_json::json;

/// A provider send failure, classified for the retry loop.
///
/// Transient errors are retried within the provider's budget; permanent
/// errors fail the provider immediately and move failover to the next one.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    // Transport-level failures (connect, TLS, timeouts) are all retryable.
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

/// A third-party service that can deliver on a channel.
///
/// The configured provider order IS the failover policy; there is no
/// separate policy object.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, msg: &DispatchMessage) -> Result<(), ProviderError>;
}

pub struct SesProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl SesProvider {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            endpoint,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for SesProvider {
    fn name(&self) -> &'static str {
        "ses"
    }

    async fn send(&self, msg: &DispatchMessage) -> Result<(), ProviderError> {
        let body = json!({
            "template_id": msg.template_id,
            "to": msg.payload.get("to"),
            "data": msg.payload.get("data"),
        });

        let response = self
            .client
            .post(format!("{}/send", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Transient(format!("ses temporary error: {status}")));
        }
        if status.is_client_error() {
            return Err(ProviderError::Permanent(format!("ses permanent error: {status}")));
        }
        Ok(())
    }
}

pub struct SendGridProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl SendGridProvider {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            endpoint,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for SendGridProvider {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, msg: &DispatchMessage) -> Result<(), ProviderError> {
        let body = json!({
            "template_id": msg.template_id,
            "personalizations": [msg.payload.get("to")],
            "dynamic_template_data": msg.payload.get("data"),
        });

        let response = self
            .client
            .post(format!("{}/mail/send", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Transient(format!(
                "sendgrid temporary error: {status}"
            )));
        }
        if status.is_client_error() {
            return Err(ProviderError::Permanent(format!(
                "sendgrid permanent error: {status}"
            )));
        }
        Ok(())
    }
}
