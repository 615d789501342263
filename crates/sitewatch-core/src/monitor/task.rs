use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::model::SiteId;
use crate::monitor::cycle::MonitorContext;
use crate::monitor::state::TaskState;

/// Per-site polling loop. Reloads the site each cycle and stops on its own
/// once the site is gone or inactive, or when cancelled.
pub struct MonitorTask {
    site_id: SiteId,
    ctx: MonitorContext,
    cancel_rx: watch::Receiver<bool>,
    state: Arc<RwLock<TaskState>>,
    cycle_gate: Arc<Mutex<()>>,
}

/// Owner's side of a spawned [`MonitorTask`].
pub struct TaskHandle {
    site_id: SiteId,
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    state: Arc<RwLock<TaskState>>,
}

impl MonitorTask {
    /// Spawns the loop. `cycle_gate` is held for the duration of each cycle so
    /// checks for one site never run concurrently with a manual sweep.
    pub fn spawn(site_id: SiteId, ctx: MonitorContext, cycle_gate: Arc<Mutex<()>>) -> TaskHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(TaskState::Running));
        let task = MonitorTask {
            site_id: site_id.clone(),
            ctx,
            cancel_rx,
            state: Arc::clone(&state),
            cycle_gate,
        };
        let span = tracing::info_span!("monitor", site_id = %site_id);
        let join = tokio::spawn(task.run().instrument(span));
        TaskHandle {
            site_id,
            cancel_tx,
            join,
            state,
        }
    }

    async fn run(self) {
        let MonitorTask {
            site_id,
            ctx,
            mut cancel_rx,
            state,
            cycle_gate,
        } = self;
        info!("Monitor task started");
        let mut interval = ctx.config.fallback_interval;

        loop {
            let cycle = async {
                let _gate = cycle_gate.lock().await;
                let site = match ctx.load_active_site(&site_id).await {
                    Ok(Some(site)) => site,
                    Ok(None) => return Step::Stop,
                    Err(e) => {
                        warn!(error = %e, "Cycle abandoned");
                        return Step::Sleep(None);
                    }
                };
                let next = site.interval();
                if let Err(e) = ctx.check_site(&site).await {
                    warn!(error = %e, "Cycle abandoned");
                }
                Step::Sleep(Some(next))
            };

            let step = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => break,
                step = cycle => step,
            };

            match step {
                Step::Stop => {
                    info!("Site removed or deactivated");
                    break;
                }
                Step::Sleep(next) => {
                    if let Some(next) = next {
                        interval = next;
                    }
                }
            }

            debug!(sleep_ms = interval.as_millis() as u64, "Waiting for next cycle");
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        *state.write().await = TaskState::Stopped;
        info!("Monitor task stopped");
    }
}

enum Step {
    Stop,
    /// Sleep for the site's interval, or the last known one if `None`.
    Sleep(Option<Duration>),
}

/// Resolves once cancellation is requested or the handle is dropped.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancel| *cancel).await;
}

impl TaskHandle {
    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    pub async fn state(&self) -> TaskState {
        *self.state.read().await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Requests cancellation. Idempotent; a no-op on a stopped task.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Cancels and waits up to `grace` for the task to exit. A task that
    /// does not exit in time is aborted and abandoned. Returns false in that case.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.cancel();
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    site_id = %self.site_id,
                    grace_ms = grace.as_millis() as u64,
                    "Monitor task ignored cancellation, abandoning it"
                );
                self.join.abort();
                *self.state.write().await = TaskState::Stopped;
                false
            }
        }
    }
}
