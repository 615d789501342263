use std::sync::Arc;

use sitewatch_core::{Stores, Supervisor};

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    pub fn stores(&self) -> &Stores {
        &self.supervisor.context().stores
    }
}
