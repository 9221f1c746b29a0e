//! Webhook delivery with retry and signature.
//!
//! Accepted events are posted as JSON to a single endpoint with:
//! - HMAC-SHA256 payload signing for verification
//! - Exponential backoff retry on transient failures

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use crate::error::{MaintmeError, MaintmeResult};
use crate::traits::Notifier;
use crate::types::{Event, SubscriberId};

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 10_000,
            multiplier: 2.0_f32,
        }
    }
}

/// Webhook endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook endpoint URL
    pub url: String,
    /// Secret for HMAC signing (optional but recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Retry policy
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl WebhookConfig {
    /// Create a new webhook config
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: None,
            retry_policy: RetryPolicy::default(),
            timeout_secs: default_timeout(),
        }
    }

    /// Builder: set secret for signing
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Builder: set retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Body posted for each event.
#[derive(Debug, Serialize)]
struct Delivery<'a> {
    subscriber_id: SubscriberId,
    event: &'a Event,
}

/// Posts accepted events to a webhook endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Create a notifier for the configured endpoint.
    pub fn new(config: WebhookConfig) -> MaintmeResult<Self> {
        if config.url.is_empty() {
            return Err(MaintmeError::Configuration(
                "webhook url must not be empty".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MaintmeError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the webhook config
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Sign payload with HMAC-SHA256, empty when no secret is configured.
    fn sign_payload(&self, payload: &str) -> String {
        match &self.config.secret {
            Some(secret) => sign(payload, secret).unwrap_or_default(),
            None => String::new(),
        }
    }

    async fn post_once(
        &self,
        payload: &str,
        signature: &str,
        event_type: &str,
    ) -> MaintmeResult<()> {
        let response = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("X-Maintme-Signature", signature)
            .header("X-Maintme-Event", event_type)
            .header("X-Maintme-Delivery", uuid::Uuid::new_v4().to_string())
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| MaintmeError::delivery(format!("Network error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() || status.as_u16() == 429 {
            Err(MaintmeError::delivery(format!("Server error: {}", status)))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(MaintmeError::delivery_rejected(format!(
                "Client error {}: {}",
                status, body
            )))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subscriber_id: SubscriberId, event: &Event) -> MaintmeResult<()> {
        let payload = serde_json::to_string(&Delivery {
            subscriber_id,
            event,
        })?;
        let signature = self.sign_payload(&payload);

        let policy = &self.config.retry_policy;
        (|| self.post_once(&payload, &signature, &event.event_type))
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(policy.max_retries as usize)
                    .with_min_delay(Duration::from_millis(policy.initial_delay_ms))
                    .with_max_delay(Duration::from_millis(policy.max_delay_ms))
                    .with_factor(policy.multiplier),
            )
            .when(|e| e.is_retryable_delivery())
            .notify(|err, dur| {
                warn!(
                    url = %self.config.url,
                    subscriber_id,
                    event_id = %event.id,
                    retry_in = ?dur,
                    error = %err,
                    "Webhook delivery failed, retrying"
                );
            })
            .await
    }
}

fn sign(payload: &str, secret: &str) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a webhook signature.
///
/// Used by receivers to check a payload was sent by this service.
pub fn verify_signature(payload: &str, secret: &str, signature: &str) -> bool {
    match sign(payload, secret) {
        Some(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
