mod http;

pub use http::HttpProber;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{CheckResult, Site};

/// Why a probe produced no usable HTTP response. Rendered into the
/// `error` field of a DOWN check; never returned past [`Prober::probe`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("INVALID_URL")]
    InvalidUrl,
    #[error("timed out after {0}ms")]
    Timeout(u128),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// Performs one health check against a site.
///
/// Implementations must always return a [`CheckResult`]: every failure mode
/// is folded into a DOWN result. The trait is object-safe and Send + Sync so
/// a single prober can be shared by every monitor task.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, site: &Site, timeout: Duration) -> CheckResult;
}

/// True when `url` uses http or https and names a host.
pub fn is_valid_url(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| {
            matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty())
        })
        .unwrap_or(false)
}
