//! Webhook alert delivery.
//!
//! Each alert is POSTed as a JSON envelope to every configured endpoint,
//! optionally signed with HMAC-SHA256. The send succeeds if at least one
//! endpoint accepted the payload.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Notifier, SendError};

pub const SIGNATURE_HEADER: &str = "X-Sitewatch-Signature-256";

/// Configuration for a single webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    /// Optional HMAC-SHA256 signing secret for the signature header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

fn default_webhook_retries() -> u32 {
    2
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: default_webhook_timeout_ms(),
            max_retries: default_webhook_retries(),
            secret: None,
        }
    }
}

/// The JSON envelope POSTed to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub version: u8,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl WebhookPayload {
    pub fn alert(recipient: &str, subject: &str, body: &str) -> Self {
        Self {
            version: 1,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            notification_type: "alert".to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

pub struct WebhookNotifier {
    webhooks: Vec<WebhookConfig>,
    client: Client,
    base_backoff: Duration,
}

impl WebhookNotifier {
    pub fn new(webhooks: Vec<WebhookConfig>, client: Client) -> Self {
        Self {
            webhooks,
            client,
            base_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), SendError> {
        if self.webhooks.is_empty() {
            return Err(SendError::NoEndpoints);
        }

        let payload = WebhookPayload::alert(recipient, subject, body);
        let json_bytes = serde_json::to_vec(&payload)?;

        let mut delivered = 0usize;
        let mut last_error = None;
        for wh in &self.webhooks {
            match deliver(&self.client, wh, &json_bytes, self.base_backoff).await {
                Ok(()) => {
                    debug!(url = %wh.url, recipient, "Webhook delivered");
                    delivered += 1;
                }
                Err(e) => {
                    warn!(url = %wh.url, recipient, error = %e, "Webhook delivery failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

async fn deliver(
    client: &Client,
    wh: &WebhookConfig,
    body: &[u8],
    base_backoff: Duration,
) -> Result<(), SendError> {
    let mut last_error = None;

    for attempt in 0..=wh.max_retries {
        if attempt > 0 {
            let backoff = base_backoff * 2u32.saturating_pow(attempt - 1);
            tokio::time::sleep(backoff).await;
        }

        let mut req = client
            .post(&wh.url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_millis(wh.timeout_ms))
            .body(body.to_vec());

        if let Some(secret) = wh.secret.as_deref() {
            req = req.header(SIGNATURE_HEADER, format!("sha256={}", sign_payload(body, secret)));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let err = SendError::Status {
                    url: wh.url.clone(),
                    status,
                };
                if (400..500).contains(&status) && status != 429 {
                    return Err(err);
                }
                last_error = Some(err);
            }
            Err(e) => {
                last_error = Some(SendError::Transport {
                    url: wh.url.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(last_error.unwrap_or(SendError::NoEndpoints))
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
