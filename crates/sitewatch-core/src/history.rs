//! Summaries over a site's check history.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{CheckResult, CheckStatus, SiteId};

/// Number of most recent checks the overall uptime figure covers.
pub const UPTIME_SAMPLE: usize = 100;

/// Window for the short-term uptime figure.
pub const RECENT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Percentage of UP checks, rounded to two decimals. 0.0 for no checks.
pub fn uptime_percent(checks: &[CheckResult]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    let up = checks.iter().filter(|c| c.is_up()).count();
    let pct = up as f64 / checks.len() as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Checks taken within `window` before `now`.
pub fn filter_recent(checks: &[CheckResult], window: Duration, now: DateTime<Utc>) -> Vec<CheckResult> {
    let Ok(window) = chrono::Duration::from_std(window) else {
        return checks.to_vec();
    };
    let since = now - window;
    checks
        .iter()
        .filter(|c| c.timestamp >= since)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStatus {
    pub site_id: SiteId,
    /// `None` until the first check has been recorded.
    pub status: Option<CheckStatus>,
    pub last_check: Option<CheckResult>,
    pub uptime_percent: f64,
    pub uptime_last_hour: f64,
}

impl SiteStatus {
    /// Builds a status from newest-first history.
    pub fn from_recent(site_id: SiteId, recent: &[CheckResult], now: DateTime<Utc>) -> Self {
        let sample = &recent[..recent.len().min(UPTIME_SAMPLE)];
        let last_hour = filter_recent(sample, RECENT_WINDOW, now);
        let last_check = recent.first().cloned();
        Self {
            site_id,
            status: last_check.as_ref().map(|c| c.status),
            last_check,
            uptime_percent: uptime_percent(sample),
            uptime_last_hour: uptime_percent(&last_hour),
        }
    }

    pub fn status_label(&self) -> String {
        self.status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(up: bool, minutes_ago: i64, now: DateTime<Utc>) -> CheckResult {
        let id = SiteId::from("s1");
        let check = if up {
            CheckResult::from_response(id, 200, 20)
        } else {
            CheckResult::failed(id, "connection refused")
        };
        check.with_timestamp(now - chrono::Duration::minutes(minutes_ago))
    }

    #[test]
    fn uptime_of_empty_history_is_zero() {
        assert_eq!(uptime_percent(&[]), 0.0);
    }

    #[test]
    fn uptime_rounds_to_two_decimals() {
        let now = Utc::now();
        let checks = vec![check(true, 0, now), check(true, 1, now), check(false, 2, now)];
        assert_eq!(uptime_percent(&checks), 66.67);
    }

    #[test]
    fn filter_recent_drops_old_checks() {
        let now = Utc::now();
        let checks = vec![check(true, 5, now), check(false, 59, now), check(true, 61, now)];
        let recent = filter_recent(&checks, RECENT_WINDOW, now);
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|c| c.timestamp > now - chrono::Duration::hours(1)));
    }

    #[test]
    fn status_of_unchecked_site_is_unknown() {
        let status = SiteStatus::from_recent(SiteId::from("s1"), &[], Utc::now());
        assert_eq!(status.status, None);
        assert_eq!(status.status_label(), "unknown");
        assert_eq!(status.uptime_percent, 0.0);
    }

    #[test]
    fn status_reports_latest_and_windows() {
        let now = Utc::now();
        let recent = vec![check(false, 0, now), check(true, 30, now), check(true, 120, now), check(true, 180, now)];
        let status = SiteStatus::from_recent(SiteId::from("s1"), &recent, now);
        assert_eq!(status.status, Some(CheckStatus::Down));
        assert_eq!(status.status_label(), "DOWN");
        assert_eq!(status.uptime_percent, 75.0);
        assert_eq!(status.uptime_last_hour, 50.0);
    }
}
