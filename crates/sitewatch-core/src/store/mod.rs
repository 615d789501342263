//! Collaborator interfaces for persisted sites, checks and alerts.
//!
//! Every operation is a single atomic read or write. Monitor tasks only ever
//! touch their own site's records, so implementations need no cross-key
//! transactions.

mod memory;

pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Alert, AlertKind, CheckResult, Site, SiteId};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn get_by_id(&self, id: &SiteId) -> Result<Option<Site>, StoreError>;
    async fn list_active(&self) -> Result<Vec<Site>, StoreError>;
}

#[async_trait]
pub trait CheckStore: Send + Sync {
    async fn append(&self, check: CheckResult) -> Result<(), StoreError>;

    /// Newest first, at most `limit` items.
    async fn recent_descending(
        &self,
        site_id: &SiteId,
        limit: usize,
    ) -> Result<Vec<CheckResult>, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn append(&self, alert: Alert) -> Result<(), StoreError>;
    async fn most_recent(
        &self,
        site_id: &SiteId,
        kind: AlertKind,
    ) -> Result<Option<Alert>, StoreError>;
}

/// The three stores a monitor cycle reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub sites: Arc<dyn SiteStore>,
    pub checks: Arc<dyn CheckStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Stores {
    pub fn new(
        sites: Arc<dyn SiteStore>,
        checks: Arc<dyn CheckStore>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        Self {
            sites,
            checks,
            alerts,
        }
    }

    /// All three roles backed by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            sites: store.clone(),
            checks: store.clone(),
            alerts: store,
        }
    }
}
