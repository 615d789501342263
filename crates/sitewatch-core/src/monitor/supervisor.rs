//! Registry of running monitor tasks.
//!
//! Operations on one site id are serialized through that id's slot mutex;
//! operations on different ids proceed independently. A slot is only ever
//! acted on while it is still the one stored in the map, so a `stop` that
//! removes a slot cannot race a `reschedule` into spawning a second task.

use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::model::SiteId;
use crate::monitor::cycle::{run_cycle, CycleOutcome, MonitorContext};
use crate::monitor::error::CycleError;
use crate::monitor::state::TaskState;
use crate::monitor::task::{MonitorTask, TaskHandle};
use crate::store::StoreError;

type Slot = Arc<Mutex<Option<TaskHandle>>>;

pub struct Supervisor {
    ctx: MonitorContext,
    slots: DashMap<SiteId, Slot>,
    /// Held for the duration of any cycle for a site, scheduled or swept.
    gates: DashMap<SiteId, Arc<Mutex<()>>>,
}

/// Totals from one manual sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub up: usize,
    pub down: usize,
    pub alerts: usize,
    pub failures: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: Result<CycleOutcome, CycleError>) {
        match outcome {
            Ok(CycleOutcome::Checked { report, .. }) => {
                self.checked += 1;
                if report.check.is_up() {
                    self.up += 1;
                } else {
                    self.down += 1;
                }
                if report.alert.is_some() {
                    self.alerts += 1;
                }
            }
            Ok(CycleOutcome::SiteGone) => {}
            Err(e) => {
                warn!(site_id = %e.site_id(), error = %e, "Sweep cycle failed");
                self.failures += 1;
            }
        }
    }
}

impl Supervisor {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            ctx,
            slots: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    /// Replaces whatever is registered with one task per active site.
    /// Returns the number of tasks spawned.
    pub async fn start_all(&self) -> Result<usize, StoreError> {
        self.shutdown_all().await;
        let sites = self.ctx.stores.sites.list_active().await?;
        let count = sites.len();
        futures::future::join_all(sites.iter().map(|site| self.reschedule(&site.id))).await;
        info!(count, "Monitor tasks started");
        Ok(count)
    }

    /// Cancels the task registered for `site_id`, waits for it, and spawns a
    /// replacement. Spawns directly when nothing is registered.
    pub async fn reschedule(&self, site_id: &SiteId) {
        let (_slot, mut guard) = self.lock_slot(site_id).await;
        let replaced = match guard.take() {
            Some(old) => {
                self.retire(old).await;
                true
            }
            None => false,
        };
        *guard = Some(MonitorTask::spawn(
            site_id.clone(),
            self.ctx.clone(),
            self.gate(site_id),
        ));
        info!(site_id = %site_id, replaced, "Monitor task scheduled");
    }

    /// Cancels and deregisters the task for `site_id`. A no-op when none exists.
    pub async fn stop(&self, site_id: &SiteId) {
        let (slot, mut guard) = self.lock_slot(site_id).await;
        if let Some(handle) = guard.take() {
            self.retire(handle).await;
            info!(site_id = %site_id, "Monitor task stopped");
        }
        self.slots.remove_if(site_id, |_, current| Arc::ptr_eq(current, &slot));
        self.release_gate(site_id);
    }

    /// Stops every registered task concurrently.
    pub async fn shutdown_all(&self) {
        let ids: Vec<SiteId> = self.slots.iter().map(|e| e.key().clone()).collect();
        if ids.is_empty() {
            return;
        }
        futures::future::join_all(ids.iter().map(|id| self.stop(id))).await;
        info!(count = ids.len(), "All monitor tasks shut down");
    }

    /// Runs one immediate cycle for every active site, outside the timers.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let sites = self.ctx.stores.sites.list_active().await?;
        let limit = self.ctx.config.sweep_concurrency.max(1);

        let outcomes: Vec<_> = stream::iter(sites)
            .map(|site| async move {
                let gate = self.gate(&site.id);
                let outcome = {
                    let _held = gate.lock().await;
                    run_cycle(&self.ctx, &site.id).await
                };
                drop(gate);
                self.release_gate(&site.id);
                outcome
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for outcome in outcomes {
            report.record(outcome);
        }
        info!(
            checked = report.checked,
            down = report.down,
            alerts = report.alerts,
            failures = report.failures,
            "Manual sweep finished"
        );
        Ok(report)
    }

    pub fn is_registered(&self, site_id: &SiteId) -> bool {
        self.slots.contains_key(site_id)
    }

    /// State of the registered task, or `None` if nothing is registered.
    pub async fn task_state(&self, site_id: &SiteId) -> Option<TaskState> {
        let slot = self.slots.get(site_id).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock().await;
        match guard.as_ref() {
            Some(handle) => Some(handle.state().await),
            None => None,
        }
    }

    /// Every registered site with its task state, ordered by id.
    pub async fn tasks(&self) -> Vec<(SiteId, TaskState)> {
        let mut ids: Vec<SiteId> = self.slots.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(state) = self.task_state(&id).await {
                out.push((id, state));
            }
        }
        out
    }

    pub async fn running_count(&self) -> usize {
        self.tasks()
            .await
            .iter()
            .filter(|(_, state)| state.is_running())
            .count()
    }

    fn gate(&self, site_id: &SiteId) -> Arc<Mutex<()>> {
        Arc::clone(self.gates.entry(site_id.clone()).or_default().value())
    }

    /// Drops the gate for an unregistered site once nothing else holds it.
    fn release_gate(&self, site_id: &SiteId) {
        self.gates.remove_if(site_id, |_, gate| {
            Arc::strong_count(gate) == 1 && !self.slots.contains_key(site_id)
        });
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Locks the slot for `site_id`, creating it if needed. Retries when the
    /// slot was removed from the map while this call waited on it.
    async fn lock_slot(&self, site_id: &SiteId) -> (Slot, OwnedMutexGuard<Option<TaskHandle>>) {
        loop {
            let slot = Arc::clone(self.slots.entry(site_id.clone()).or_default().value());
            let guard = Arc::clone(&slot).lock_owned().await;
            let current = self
                .slots
                .get(site_id)
                .is_some_and(|s| Arc::ptr_eq(s.value(), &slot));
            if current {
                return (slot, guard);
            }
        }
    }

    /// A task that outlives the grace period has already been logged and
    /// aborted by its handle.
    async fn retire(&self, handle: TaskHandle) {
        handle.shutdown(self.ctx.config.cancel_grace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::SchedulerConfig;
    use crate::model::{CheckResult, Site};
    use crate::notify::LogNotifier;
    use crate::probe::Prober;
    use crate::store::{MemoryStore, Stores};

    #[derive(Default)]
    struct CountingProber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, site: &Site, _timeout: Duration) -> CheckResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            CheckResult::from_response(site.id.clone(), 200, 5)
        }
    }

    async fn supervisor(sites: &[Site]) -> (Supervisor, Arc<MemoryStore>, Arc<CountingProber>) {
        let store = Arc::new(MemoryStore::new());
        for site in sites {
            store.upsert_site(site.clone()).await;
        }
        let prober = Arc::new(CountingProber::default());
        let ctx = MonitorContext::new(
            Stores::memory(store.clone()),
            prober.clone(),
            Arc::new(LogNotifier),
            SchedulerConfig::default(),
        );
        (Supervisor::new(ctx), store, prober)
    }

    #[tokio::test(start_paused = true)]
    async fn start_all_spawns_one_task_per_active_site() {
        let (sup, _, _) = supervisor(&[
            Site::new("a", "https://a.example.com", 10),
            Site::new("b", "https://b.example.com", 10),
            Site::new("c", "https://c.example.com", 10).with_active(false),
        ])
        .await;

        assert_eq!(sup.start_all().await.unwrap(), 2);
        let tasks = sup.tasks().await;
        assert_eq!(
            tasks,
            vec![
                (SiteId::from("a"), TaskState::Running),
                (SiteId::from("b"), TaskState::Running),
            ]
        );
        sup.shutdown_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_all_is_idempotent() {
        let (sup, _, _) = supervisor(&[Site::new("a", "https://a.example.com", 10)]).await;
        sup.start_all().await.unwrap();
        sup.start_all().await.unwrap();
        assert_eq!(sup.running_count().await, 1);
        sup.shutdown_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_deregisters() {
        let (sup, _, _) = supervisor(&[Site::new("a", "https://a.example.com", 10)]).await;
        let id = SiteId::from("a");

        sup.stop(&id).await;
        assert!(!sup.is_registered(&id));

        sup.reschedule(&id).await;
        assert!(sup.is_registered(&id));
        sup.stop(&id).await;
        sup.stop(&id).await;
        assert!(!sup.is_registered(&id));
        assert_eq!(sup.task_state(&id).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_keeps_a_single_task() {
        let (sup, _, _) = supervisor(&[Site::new("a", "https://a.example.com", 10)]).await;
        let id = SiteId::from("a");
        tokio::join!(sup.reschedule(&id), sup.reschedule(&id), sup.reschedule(&id));
        assert_eq!(sup.tasks().await.len(), 1);
        assert_eq!(sup.running_count().await, 1);
        sup.shutdown_all().await;
        assert!(sup.tasks().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_probing() {
        let (sup, _, prober) = supervisor(&[Site::new("a", "https://a.example.com", 1)]).await;
        sup.start_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        sup.shutdown_all().await;

        let calls = prober.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected at least two probes, got {calls}");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_checks_every_active_site_once() {
        let (sup, store, prober) = supervisor(&[
            Site::new("a", "https://a.example.com", 60),
            Site::new("b", "https://b.example.com", 60),
            Site::new("c", "https://c.example.com", 60).with_active(false),
        ])
        .await;

        let report = sup.sweep().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                checked: 2,
                up: 2,
                ..Default::default()
            }
        );
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.all_checks(&SiteId::from("a")).await.len(), 1);
        assert_eq!(store.all_checks(&SiteId::from("b")).await.len(), 1);
        assert!(sup.tasks().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn gates_are_released_with_their_sites() {
        let (sup, _, _) = supervisor(&[
            Site::new("a", "https://a.example.com", 60),
            Site::new("b", "https://b.example.com", 60),
        ])
        .await;

        sup.sweep().await.unwrap();
        assert_eq!(sup.gate_count(), 0);

        sup.start_all().await.unwrap();
        sup.sweep().await.unwrap();
        assert_eq!(sup.gate_count(), 2);

        sup.stop(&SiteId::from("a")).await;
        assert_eq!(sup.gate_count(), 1);
        sup.shutdown_all().await;
        assert_eq!(sup.gate_count(), 0);
    }
}
