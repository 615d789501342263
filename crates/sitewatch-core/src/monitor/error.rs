use thiserror::Error;

use crate::model::SiteId;
use crate::store::StoreError;

/// A monitor cycle that could not finish. Logged by the task, which then
/// sleeps and retries; it never terminates the task.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to load site {site_id}: {source}")]
    LoadSite { site_id: SiteId, source: StoreError },
    #[error("failed to record check for {site_id}: {source}")]
    RecordCheck { site_id: SiteId, source: StoreError },
    #[error("failed to read history for {site_id}: {source}")]
    ReadHistory { site_id: SiteId, source: StoreError },
    #[error("failed to record alert for {site_id}: {source}")]
    RecordAlert { site_id: SiteId, source: StoreError },
}

impl CycleError {
    pub fn site_id(&self) -> &SiteId {
        match self {
            Self::LoadSite { site_id, .. }
            | Self::RecordCheck { site_id, .. }
            | Self::ReadHistory { site_id, .. }
            | Self::RecordAlert { site_id, .. } => site_id,
        }
    }
}
