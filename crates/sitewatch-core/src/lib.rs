#![forbid(unsafe_code)]

pub mod config;
pub mod history;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod store;

pub use config::SchedulerConfig;
pub use history::{filter_recent, uptime_percent, SiteStatus};
pub use model::{Alert, AlertKind, CheckResult, CheckStatus, Site, SiteId};
pub use monitor::{
    run_cycle, AlertDecision, AlertPolicy, CheckReport, CycleError, CycleOutcome, MonitorContext,
    MonitorTask, Supervisor, SweepReport, TaskHandle, TaskState,
};
pub use notify::{LogNotifier, Notifier, SendError, WebhookConfig, WebhookNotifier, WebhookPayload};
pub use probe::{is_valid_url, HttpProber, ProbeError, Prober};
pub use store::{AlertStore, CheckStore, MemoryStore, SiteStore, StoreError, Stores};
