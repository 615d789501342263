use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Site;

/// Gap kept between a probe's timeout and the site's poll interval.
const PROBE_INTERVAL_MARGIN: Duration = Duration::from_millis(100);

/// Configuration shared by every monitor task and the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Probe timeout used when a site has no override (default: 10s).
    pub default_probe_timeout: Duration,
    /// Number of most-recent checks that must all be DOWN to alert (default: 3).
    pub consecutive_down_threshold: usize,
    /// Minimum time between two DOWN alerts for one site (default: 30min).
    pub cooldown: Duration,
    /// How long the supervisor waits for a cancelled task before abandoning it.
    pub cancel_grace: Duration,
    /// Sleep used when the site record could not be loaded at all.
    pub fallback_interval: Duration,
    /// Upper bound on sites probed at once during a manual sweep.
    pub sweep_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_probe_timeout: Duration::from_secs(10),
            consecutive_down_threshold: 3,
            cooldown: Duration::from_secs(30 * 60),
            cancel_grace: Duration::from_secs(5),
            fallback_interval: Duration::from_secs(60),
            sweep_concurrency: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn with_default_probe_timeout(mut self, timeout: Duration) -> Self {
        self.default_probe_timeout = timeout;
        self
    }

    pub fn with_consecutive_down_threshold(mut self, threshold: usize) -> Self {
        self.consecutive_down_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_fallback_interval(mut self, interval: Duration) -> Self {
        self.fallback_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_sweep_concurrency(mut self, max: usize) -> Self {
        self.sweep_concurrency = max.max(1);
        self
    }

    /// Effective probe timeout for `site`: its override or the default,
    /// always strictly shorter than the site's poll interval.
    pub fn probe_timeout_for(&self, site: &Site) -> Duration {
        let requested = site.timeout().unwrap_or(self.default_probe_timeout);
        let ceiling = site
            .interval()
            .saturating_sub(PROBE_INTERVAL_MARGIN)
            .max(Duration::from_millis(1));
        requested.min(ceiling).max(Duration::from_millis(1))
    }
}
