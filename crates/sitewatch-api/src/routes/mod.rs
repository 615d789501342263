mod sites;
mod sweep;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub use sites::{SiteStatusResponse, TaskSummary, TasksResponse};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sweep", post(sweep::run_sweep))
        .route("/tasks", get(sites::list_tasks))
        .route("/sites/{id}/reschedule", post(sites::reschedule_site))
        .route("/sites/{id}/stop", post(sites::stop_site))
        .route("/sites/{id}/status", get(sites::site_status))
}
