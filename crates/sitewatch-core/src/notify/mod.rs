//! Alert delivery.
//!
//! The monitor cycle records an alert first and then hands it to a
//! [`Notifier`]. A failed send is logged by the caller; it never rolls back
//! the alert record or stops the task.

mod webhook;

pub use webhook::{WebhookConfig, WebhookNotifier, WebhookPayload};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("no notification endpoints configured")]
    NoEndpoints,
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), SendError>;
}

/// Writes alerts to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), SendError> {
        warn!(recipient, subject, body, "Alert raised");
        Ok(())
    }
}
