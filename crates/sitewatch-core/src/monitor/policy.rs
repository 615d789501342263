//! Outage detection and alert deduplication.
//!
//! ```text
//! last N checks all DOWN? ──no──▶ NotDown / InsufficientHistory
//!          │yes
//! prior DOWN alert inside cooldown? ──yes──▶ CoolingDown
//!          │no
//! recipient configured? ──no──▶ NoRecipient
//!          │yes
//!        Fire(alert)
//! ```

use chrono::{DateTime, Utc};

use crate::config::SchedulerConfig;
use crate::model::{Alert, AlertKind, CheckResult, Site};

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    /// Fewer than N checks have ever been recorded.
    InsufficientHistory,
    /// At least one of the last N checks was UP.
    NotDown,
    /// An outage, but a DOWN alert already went out at `since`.
    CoolingDown { since: DateTime<Utc> },
    /// An outage with nobody to tell.
    NoRecipient,
    Fire(Alert),
}

impl AlertDecision {
    pub fn fires(&self) -> bool {
        matches!(self, Self::Fire(_))
    }

    pub fn into_alert(self) -> Option<Alert> {
        match self {
            Self::Fire(alert) => Some(alert),
            _ => None,
        }
    }
}

/// Pure decision function over recent history; performs no I/O.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    threshold: usize,
    cooldown: chrono::Duration,
}

impl AlertPolicy {
    pub fn new(threshold: usize, cooldown: std::time::Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown: chrono::Duration::from_std(cooldown)
                .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100)),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.consecutive_down_threshold, config.cooldown)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// `recent` must be newest first; only its first N entries are considered.
    pub fn evaluate(
        &self,
        site: &Site,
        recent: &[CheckResult],
        last_alert: Option<&Alert>,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        if recent.len() < self.threshold {
            return AlertDecision::InsufficientHistory;
        }
        let window = &recent[..self.threshold];
        if !window.iter().all(CheckResult::is_down) {
            return AlertDecision::NotDown;
        }

        if let Some(prev) = last_alert.filter(|a| a.kind == AlertKind::Down) {
            if now.signed_duration_since(prev.timestamp) < self.cooldown {
                return AlertDecision::CoolingDown {
                    since: prev.timestamp,
                };
            }
        }

        let Some(recipient) = site.recipient() else {
            return AlertDecision::NoRecipient;
        };

        let latest = &window[0];
        let subject = format!("[ALERT] {} is DOWN", site.label());
        let message = format!(
            "Site {} appears DOWN. Last error: {}. Time: {}",
            site.url,
            latest.failure_reason(),
            latest.timestamp.to_rfc3339()
        );
        AlertDecision::Fire(Alert::new(
            site.id.clone(),
            AlertKind::Down,
            recipient,
            subject,
            message,
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SiteId;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn policy() -> AlertPolicy {
        AlertPolicy::new(3, StdDuration::from_secs(30 * 60))
    }

    fn site() -> Site {
        Site::new("s1", "https://shop.example.com", 60)
            .with_name("Shop")
            .with_owner_email("ops@example.com")
    }

    fn down(secs_ago: i64) -> CheckResult {
        CheckResult::failed(SiteId::from("s1"), "timed out after 5000ms")
            .with_timestamp(Utc::now() - Duration::seconds(secs_ago))
    }

    fn up(secs_ago: i64) -> CheckResult {
        CheckResult::from_response(SiteId::from("s1"), 200, 40)
            .with_timestamp(Utc::now() - Duration::seconds(secs_ago))
    }

    fn prior_alert(minutes_ago: i64) -> Alert {
        Alert::new(
            SiteId::from("s1"),
            AlertKind::Down,
            "ops@example.com",
            "subject",
            "body",
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn fires_on_threshold_consecutive_down() {
        let recent = vec![down(0), down(60), down(120)];
        let decision = policy().evaluate(&site(), &recent, None, Utc::now());
        let alert = decision.into_alert().expect("should fire");
        assert_eq!(alert.kind, AlertKind::Down);
        assert_eq!(alert.recipient, "ops@example.com");
        assert_eq!(alert.subject, "[ALERT] Shop is DOWN");
        assert!(alert.message.contains("https://shop.example.com"));
        assert!(alert.message.contains("timed out after 5000ms"));
        assert!(alert.message.contains(&recent[0].timestamp.to_rfc3339()));
    }

    #[test]
    fn suppressed_when_head_is_not_all_down() {
        for threshold in 3..6 {
            let policy = AlertPolicy::new(threshold, StdDuration::from_secs(1800));
            let mut recent = vec![down(0), down(60), up(120)];
            recent.extend((3..threshold as i64 + 3).map(|i| down(i * 60)));
            let decision = policy.evaluate(&site(), &recent, None, Utc::now());
            assert_eq!(decision, AlertDecision::NotDown);
        }
    }

    #[test]
    fn never_fires_without_enough_history() {
        let recent = vec![down(0), down(60)];
        let decision = policy().evaluate(&site(), &recent, None, Utc::now());
        assert_eq!(decision, AlertDecision::InsufficientHistory);
    }

    #[test]
    fn cooldown_suppresses_recent_alert() {
        let recent = vec![down(0), down(60), down(120)];
        let prev = prior_alert(10);
        let decision = policy().evaluate(&site(), &recent, Some(&prev), Utc::now());
        assert_eq!(decision, AlertDecision::CoolingDown { since: prev.timestamp });
    }

    #[test]
    fn fires_again_after_cooldown() {
        let recent = vec![down(0), down(60), down(120)];
        let prev = prior_alert(31);
        let decision = policy().evaluate(&site(), &recent, Some(&prev), Utc::now());
        assert!(decision.fires());
    }

    #[test]
    fn no_recipient_never_fires() {
        let recent = vec![down(0), down(60), down(120)];
        let mut site = site();
        site.owner_email = None;
        let decision = policy().evaluate(&site, &recent, None, Utc::now());
        assert_eq!(decision, AlertDecision::NoRecipient);
    }

    #[test]
    fn only_the_head_window_counts() {
        // Older UP checks beyond the window do not matter.
        let recent = vec![down(0), down(60), down(120), up(180), up(240)];
        assert!(policy().evaluate(&site(), &recent, None, Utc::now()).fires());
    }

    #[test]
    fn non_2xx_failure_reason_in_message() {
        let recent = vec![
            CheckResult::from_response(SiteId::from("s1"), 502, 30),
            down(60),
            down(120),
        ];
        let alert = policy()
            .evaluate(&site(), &recent, None, Utc::now())
            .into_alert()
            .unwrap();
        assert!(alert.message.contains("Last error: HTTP 502"));
    }
}
