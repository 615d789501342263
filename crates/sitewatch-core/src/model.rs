use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of a registered site, as issued by the site store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SiteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A registered monitoring target. Owned by the site store; the scheduler
/// re-reads it once per cycle so edits take effect without a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    pub interval_secs: u64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_active() -> bool {
    true
}

impl Site {
    pub fn new(id: impl Into<SiteId>, url: impl Into<String>, interval_secs: u64) -> Self {
        Self {
            id: id.into(),
            name: None,
            url: url.into(),
            interval_secs,
            active: true,
            owner_email: None,
            timeout_ms: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_owner_email(mut self, email: impl Into<String>) -> Self {
        self.owner_email = Some(email.into());
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Poll interval. A zero interval is treated as one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Human-readable label: the name if set, else the url.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// The alert recipient, ignoring blank addresses.
    pub fn recipient(&self) -> Option<&str> {
        self.owner_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Outcome of one probe. Append-only; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub site_id: SiteId,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    /// Classifies an HTTP response: 200 through 399 is UP, anything else DOWN.
    pub fn from_response(site_id: SiteId, status_code: u16, latency_ms: u64) -> Self {
        let status = if (200..=399).contains(&status_code) {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        };
        Self {
            id: Uuid::new_v4().to_string(),
            site_id,
            status,
            status_code: Some(status_code),
            latency_ms: Some(latency_ms),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A DOWN result for a probe that produced no HTTP response.
    pub fn failed(site_id: SiteId, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site_id,
            status: CheckStatus::Down,
            status_code: None,
            latency_ms: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == CheckStatus::Up
    }

    pub fn is_down(&self) -> bool {
        self.status == CheckStatus::Down
    }

    /// Short description of why the check failed, for alert bodies.
    pub fn failure_reason(&self) -> String {
        match (&self.error, self.status_code) {
            (Some(e), _) => e.clone(),
            (None, Some(code)) => format!("HTTP {}", code),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Down,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// A recorded alert decision. Written whether or not delivery succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub site_id: SiteId,
    pub kind: AlertKind,
    pub recipient: String,
    pub subject: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        site_id: SiteId,
        kind: AlertKind,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site_id,
            kind,
            recipient: recipient.into(),
            subject: subject.into(),
            message: message.into(),
            timestamp,
        }
    }
}
