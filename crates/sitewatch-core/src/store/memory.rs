use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AlertStore, CheckStore, SiteStore, StoreError};
use crate::model::{Alert, AlertKind, CheckResult, Site, SiteId};

/// Checks retained per site before the oldest are evicted.
pub const DEFAULT_CHECK_CAPACITY: usize = 10_000;

/// Non-persistent store backing all three store roles. Check history is a
/// per-site ring buffer; alerts are kept in full.
#[derive(Debug)]
pub struct MemoryStore {
    sites: RwLock<HashMap<SiteId, Site>>,
    checks: RwLock<HashMap<SiteId, VecDeque<CheckResult>>>,
    alerts: RwLock<HashMap<SiteId, Vec<Alert>>>,
    check_capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_check_capacity(DEFAULT_CHECK_CAPACITY)
    }

    pub fn with_check_capacity(capacity: usize) -> Self {
        Self {
            sites: RwLock::new(HashMap::new()),
            checks: RwLock::new(HashMap::new()),
            alerts: RwLock::new(HashMap::new()),
            check_capacity: capacity.max(1),
        }
    }

    pub async fn upsert_site(&self, site: Site) {
        self.sites.write().await.insert(site.id.clone(), site);
    }

    pub async fn remove_site(&self, id: &SiteId) -> Option<Site> {
        self.sites.write().await.remove(id)
    }

    /// Returns false if the site does not exist.
    pub async fn set_active(&self, id: &SiteId, active: bool) -> bool {
        match self.sites.write().await.get_mut(id) {
            Some(site) => {
                site.active = active;
                true
            }
            None => false,
        }
    }

    pub async fn site_count(&self) -> usize {
        self.sites.read().await.len()
    }

    /// Every retained check for a site, oldest first.
    pub async fn all_checks(&self, id: &SiteId) -> Vec<CheckResult> {
        self.checks
            .read()
            .await
            .get(id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every alert for a site, oldest first.
    pub async fn all_alerts(&self, id: &SiteId) -> Vec<Alert> {
        self.alerts.read().await.get(id).cloned().unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn get_by_id(&self, id: &SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.sites.read().await.get(id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Site>, StoreError> {
        let mut sites: Vec<Site> = self
            .sites
            .read()
            .await
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sites)
    }
}

#[async_trait]
impl CheckStore for MemoryStore {
    async fn append(&self, check: CheckResult) -> Result<(), StoreError> {
        let mut checks = self.checks.write().await;
        let ring = checks.entry(check.site_id.clone()).or_default();
        // Kept ordered by timestamp; a late arrival is slotted after its equals.
        match ring.back() {
            Some(last) if last.timestamp > check.timestamp => {
                let at = ring.partition_point(|c| c.timestamp <= check.timestamp);
                ring.insert(at, check);
            }
            _ => ring.push_back(check),
        }
        if ring.len() > self.check_capacity {
            ring.pop_front();
        }
        Ok(())
    }

    async fn recent_descending(
        &self,
        site_id: &SiteId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let checks = self.checks.read().await;
        let Some(ring) = checks.get(site_id) else {
            return Ok(Vec::new());
        };
        Ok(ring.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn append(&self, alert: Alert) -> Result<(), StoreError> {
        self.alerts
            .write()
            .await
            .entry(alert.site_id.clone())
            .or_default()
            .push(alert);
        Ok(())
    }

    async fn most_recent(
        &self,
        site_id: &SiteId,
        kind: AlertKind,
    ) -> Result<Option<Alert>, StoreError> {
        Ok(self.alerts.read().await.get(site_id).and_then(|alerts| {
            alerts
                .iter()
                .filter(|a| a.kind == kind)
                .max_by_key(|a| a.timestamp)
                .cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn check_at(site: &str, up: bool, secs_ago: i64) -> CheckResult {
        let id = SiteId::from(site);
        let check = if up {
            CheckResult::from_response(id, 200, 10)
        } else {
            CheckResult::failed(id, "boom")
        };
        check.with_timestamp(Utc::now() - Duration::seconds(secs_ago))
    }

    #[tokio::test]
    async fn recent_descending_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        CheckStore::append(&store, check_at("s1", true, 30)).await.unwrap();
        CheckStore::append(&store, check_at("s1", false, 20)).await.unwrap();
        CheckStore::append(&store, check_at("s1", false, 10)).await.unwrap();
        CheckStore::append(&store, check_at("s2", true, 5)).await.unwrap();

        let recent = store.recent_descending(&SiteId::from("s1"), 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp > recent[1].timestamp);
        assert!(recent.iter().all(|c| c.is_down()));
    }

    #[tokio::test]
    async fn recent_descending_for_unknown_site_is_empty() {
        let store = MemoryStore::new();
        let recent = store.recent_descending(&SiteId::from("nope"), 3).await.unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn check_ring_evicts_oldest() {
        let store = MemoryStore::with_check_capacity(2);
        for secs_ago in [30, 20, 10] {
            CheckStore::append(&store, check_at("s1", true, secs_ago)).await.unwrap();
        }
        let all = store.all_checks(&SiteId::from("s1")).await;
        assert_eq!(all.len(), 2);
        assert!(all[0].timestamp < all[1].timestamp);
    }

    #[tokio::test]
    async fn late_check_is_ordered_by_timestamp() {
        let store = MemoryStore::with_check_capacity(3);
        for secs_ago in [40, 10, 25, 5] {
            CheckStore::append(&store, check_at("s1", true, secs_ago)).await.unwrap();
        }
        let id = SiteId::from("s1");
        let all = store.all_checks(&id).await;
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let recent = store.recent_descending(&id, 2).await.unwrap();
        assert_eq!(recent[0].timestamp, all[2].timestamp);
        assert_eq!(recent[1].timestamp, all[1].timestamp);
    }

    #[tokio::test]
    async fn recent_descending_at_capacity_returns_newest() {
        let store = MemoryStore::with_check_capacity(100);
        let id = SiteId::from("s1");
        for secs_ago in (0..250).rev() {
            CheckStore::append(&store, check_at("s1", secs_ago % 2 == 0, secs_ago)).await.unwrap();
        }
        assert_eq!(store.all_checks(&id).await.len(), 100);

        let recent = store.recent_descending(&id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].timestamp > recent[1].timestamp);
        assert!(recent[1].timestamp > recent[2].timestamp);
        assert!(recent[0].is_up(), "newest check was appended last");
        assert!(recent[1].is_down());
    }

    #[tokio::test]
    async fn most_recent_alert_by_timestamp() {
        let store = MemoryStore::new();
        let id = SiteId::from("s1");
        let old = Alert::new(id.clone(), AlertKind::Down, "a@b.c", "s", "old", Utc::now() - Duration::minutes(40));
        let new = Alert::new(id.clone(), AlertKind::Down, "a@b.c", "s", "new", Utc::now());
        AlertStore::append(&store, new).await.unwrap();
        AlertStore::append(&store, old).await.unwrap();

        let latest = store.most_recent(&id, AlertKind::Down).await.unwrap().unwrap();
        assert_eq!(latest.message, "new");
        assert!(store.most_recent(&SiteId::from("s2"), AlertKind::Down).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_active_skips_inactive_sites() {
        let store = MemoryStore::new();
        store.upsert_site(Site::new("a", "https://a.example", 60)).await;
        store.upsert_site(Site::new("b", "https://b.example", 60).with_active(false)).await;
        store.upsert_site(Site::new("c", "https://c.example", 60)).await;

        let active = store.list_active().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        assert!(store.set_active(&SiteId::from("b"), true).await);
        assert!(!store.set_active(&SiteId::from("zzz"), true).await);
        assert_eq!(store.list_active().await.unwrap().len(), 3);
    }
}
