//! Outbound collaborators. Both are traits so the executor can be tested
//! without network; HTTP implementations are wired in from config at
//! bootstrap, no-ops otherwise.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use zapys_core::domain::BusinessId;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("sms gateway error: {0}")]
    Gateway(String),
}

#[derive(Clone, Debug)]
pub struct SmsSendResult {
    pub accepted: bool,
    pub provider_message_id: Option<String>,
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> Result<SmsSendResult, ProviderError>;
}

/// Fire-and-forget push to the owner's device. Failures are logged, never
/// propagated: a booking must not fail because a notification did.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify_booking(&self, business_id: &BusinessId, client_name: &str, start_time: &str);
}

/// Records the send in the log and reports it as accepted. Used when no
/// gateway endpoint is configured and in tests.
#[derive(Default)]
pub struct NoopSmsProvider;

#[async_trait]
impl SmsProvider for NoopSmsProvider {
    async fn send(&self, phone: &str, text: &str) -> Result<SmsSendResult, ProviderError> {
        info!(event_name = "sms.noop", phone, length = text.len());
        Ok(SmsSendResult { accepted: true, provider_message_id: None })
    }
}

#[derive(Default)]
pub struct NoopPushNotifier;

#[async_trait]
impl PushNotifier for NoopPushNotifier {
    async fn notify_booking(&self, business_id: &BusinessId, client_name: &str, start_time: &str) {
        info!(
            event_name = "push.noop",
            business_id = %business_id.0,
            client_name,
            start_time
        );
    }
}

pub struct HttpSmsProvider {
    http: reqwest::Client,
    endpoint: String,
    sender: Option<String>,
}

impl HttpSmsProvider {
    pub fn new(endpoint: impl Into<String>, sender: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), endpoint: endpoint.into(), sender }
    }
}

#[async_trait]
impl SmsProvider for HttpSmsProvider {
    async fn send(&self, phone: &str, text: &str) -> Result<SmsSendResult, ProviderError> {
        let payload = json!({ "to": phone, "text": text, "from": self.sender });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::Gateway(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Gateway(format!("{status}: {body}")));
        }
        let body: serde_json::Value =
            response.json().await.map_err(|err| ProviderError::Gateway(err.to_string()))?;
        Ok(SmsSendResult {
            accepted: true,
            provider_message_id: body["message_id"].as_str().map(str::to_string),
        })
    }
}

pub struct HttpPushNotifier {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPushNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

#[async_trait]
impl PushNotifier for HttpPushNotifier {
    async fn notify_booking(&self, business_id: &BusinessId, client_name: &str, start_time: &str) {
        let payload = json!({
            "business_id": business_id.0,
            "title": "Новий запис",
            "body": format!("{client_name}, {start_time}"),
        });
        if let Err(err) = self.http.post(&self.endpoint).json(&payload).send().await {
            warn!(event_name = "push.failed", error = %err);
        }
    }
}
