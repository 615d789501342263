use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::debug;

use super::{is_valid_url, ProbeError, Prober};
use crate::model::{CheckResult, Site};

/// HTTP GET prober with a pooled client. Redirects are not followed, so a
/// 3xx answer counts as UP on its own.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(Self::build_client()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn build_client() -> Result<Client, reqwest::Error> {
        Client::builder()
            .redirect(Policy::none())
            .pool_max_idle_per_host(4)
            .user_agent(concat!("sitewatch/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout(timeout.as_millis())
    } else if err.is_connect() {
        ProbeError::Connect(error_chain(&err))
    } else {
        ProbeError::Request(error_chain(&err))
    }
}

/// reqwest hides the useful part (DNS, TLS, refused) in the source chain.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, site: &Site, timeout: Duration) -> CheckResult {
        if !is_valid_url(&site.url) {
            debug!(site_id = %site.id, url = %site.url, "Skipping probe of invalid url");
            return CheckResult::failed(site.id.clone(), ProbeError::InvalidUrl.to_string());
        }

        let started = Instant::now();
        match self.client.get(&site.url).timeout(timeout).send().await {
            Ok(response) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                let status = response.status().as_u16();
                debug!(site_id = %site.id, status, latency_ms, "Probe answered");
                CheckResult::from_response(site.id.clone(), status, latency_ms)
            }
            Err(e) => {
                let err = classify(e, timeout);
                debug!(site_id = %site.id, error = %err, "Probe failed");
                CheckResult::failed(site.id.clone(), err.to_string())
            }
        }
    }
}
