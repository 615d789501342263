use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::model::{Alert, AlertKind, CheckResult, Site, SiteId};
use crate::monitor::error::CycleError;
use crate::monitor::policy::{AlertDecision, AlertPolicy};
use crate::notify::Notifier;
use crate::probe::Prober;
use crate::store::Stores;

/// Everything a monitor cycle needs, shared by all tasks of a supervisor.
#[derive(Clone)]
pub struct MonitorContext {
    pub stores: Stores,
    pub prober: Arc<dyn Prober>,
    pub notifier: Arc<dyn Notifier>,
    pub config: SchedulerConfig,
    policy: AlertPolicy,
}

impl MonitorContext {
    pub fn new(
        stores: Stores,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            policy: AlertPolicy::from_config(&config),
            stores,
            prober,
            notifier,
            config,
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// The site if it still exists and is active.
    pub async fn load_active_site(&self, site_id: &SiteId) -> Result<Option<Site>, CycleError> {
        let site = self
            .stores
            .sites
            .get_by_id(site_id)
            .await
            .map_err(|source| CycleError::LoadSite {
                site_id: site_id.clone(),
                source,
            })?;
        Ok(site.filter(|s| s.active))
    }

    /// Probe, record, evaluate, and alert for an already-loaded site.
    pub async fn check_site(&self, site: &Site) -> Result<CheckReport, CycleError> {
        let timeout = self.config.probe_timeout_for(site);
        let check = self.prober.probe(site, timeout).await;
        debug!(
            site_id = %site.id,
            status = %check.status,
            status_code = ?check.status_code,
            latency_ms = ?check.latency_ms,
            error = ?check.error,
            "Check completed"
        );

        self.stores
            .checks
            .append(check.clone())
            .await
            .map_err(|source| CycleError::RecordCheck {
                site_id: site.id.clone(),
                source,
            })?;

        let history_err = |source| CycleError::ReadHistory {
            site_id: site.id.clone(),
            source,
        };
        let recent = self
            .stores
            .checks
            .recent_descending(&site.id, self.policy.threshold())
            .await
            .map_err(history_err)?;
        let last_alert = self
            .stores
            .alerts
            .most_recent(&site.id, AlertKind::Down)
            .await
            .map_err(history_err)?;

        let decision = self
            .policy
            .evaluate(site, &recent, last_alert.as_ref(), Utc::now());
        if let AlertDecision::CoolingDown { since } = &decision {
            debug!(site_id = %site.id, last_alert = %since, "Outage alert suppressed by cooldown");
        }

        let alert = match decision.into_alert() {
            Some(alert) => {
                self.raise(site, &alert).await?;
                Some(alert)
            }
            None => None,
        };

        Ok(CheckReport { check, alert })
    }

    /// The alert record reflects the decision, so it is written before the
    /// send and kept when delivery fails.
    async fn raise(&self, site: &Site, alert: &Alert) -> Result<(), CycleError> {
        self.stores
            .alerts
            .append(alert.clone())
            .await
            .map_err(|source| CycleError::RecordAlert {
                site_id: site.id.clone(),
                source,
            })?;
        info!(site_id = %site.id, recipient = %alert.recipient, "DOWN alert raised");

        if let Err(e) = self
            .notifier
            .send(&alert.recipient, &alert.subject, &alert.message)
            .await
        {
            warn!(site_id = %site.id, recipient = %alert.recipient, error = %e, "Alert delivery failed");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub check: CheckResult,
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Checked { site: Site, report: CheckReport },
    /// The site was deleted or deactivated.
    SiteGone,
}

/// One full monitor cycle: reload, probe, record, evaluate, alert.
pub async fn run_cycle(ctx: &MonitorContext, site_id: &SiteId) -> Result<CycleOutcome, CycleError> {
    let Some(site) = ctx.load_active_site(site_id).await? else {
        return Ok(CycleOutcome::SiteGone);
    };
    let report = ctx.check_site(&site).await?;
    Ok(CycleOutcome::Checked { site, report })
}
