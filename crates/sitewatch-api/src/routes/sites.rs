use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use sitewatch_core::history::UPTIME_SAMPLE;
use sitewatch_core::{CheckResult, SiteId, SiteStatus, TaskState};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct TaskSummary {
    pub site_id: SiteId,
    pub state: TaskState,
}

#[derive(Serialize)]
pub struct TasksResponse {
    pub running: usize,
    pub tasks: Vec<TaskSummary>,
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub site_id: SiteId,
    pub state: Option<TaskState>,
    pub message: String,
}

#[derive(Serialize)]
pub struct SiteStatusResponse {
    pub site_id: SiteId,
    pub name: Option<String>,
    pub url: String,
    pub active: bool,
    pub interval_secs: u64,
    pub status: String,
    pub last_check: Option<CheckResult>,
    pub uptime_percent: f64,
    pub uptime_last_hour: f64,
    pub task: Option<TaskState>,
}

fn parse_site_id(raw: String) -> Result<SiteId, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::BadRequest("Site ID must not be blank".into()));
    }
    Ok(SiteId::from(raw))
}

/// GET /api/v1/tasks
pub async fn list_tasks(State(state): State<AppState>) -> Json<TasksResponse> {
    let tasks: Vec<TaskSummary> = state
        .supervisor
        .tasks()
        .await
        .into_iter()
        .map(|(site_id, state)| TaskSummary { site_id, state })
        .collect();
    let running = tasks.iter().filter(|t| t.state.is_running()).count();
    Json(TasksResponse { running, tasks })
}

/// POST /api/v1/sites/:id/reschedule
///
/// Replaces the site's task, picking up any edits immediately.
pub async fn reschedule_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_site_id(id)?;
    if state.stores().sites.get_by_id(&id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Site {} not found", id)));
    }
    state.supervisor.reschedule(&id).await;
    let resp = TaskResponse {
        state: state.supervisor.task_state(&id).await,
        site_id: id,
        message: "Monitor task scheduled".into(),
    };
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// POST /api/v1/sites/:id/stop
///
/// Idempotent: stopping a site with no task succeeds.
pub async fn stop_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let id = parse_site_id(id)?;
    state.supervisor.stop(&id).await;
    Ok(Json(TaskResponse {
        site_id: id,
        state: None,
        message: "Monitor task stopped".into(),
    }))
}

/// GET /api/v1/sites/:id/status
pub async fn site_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SiteStatusResponse>, ApiError> {
    let id = parse_site_id(id)?;
    let stores = state.stores();
    let site = stores
        .sites
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Site {} not found", id)))?;

    let recent = stores.checks.recent_descending(&id, UPTIME_SAMPLE).await?;
    let status = SiteStatus::from_recent(id.clone(), &recent, Utc::now());

    Ok(Json(SiteStatusResponse {
        status: status.status_label(),
        task: state.supervisor.task_state(&id).await,
        site_id: id,
        name: site.name,
        url: site.url,
        active: site.active,
        interval_secs: site.interval_secs,
        last_check: status.last_check,
        uptime_percent: status.uptime_percent,
        uptime_last_hour: status.uptime_last_hour,
    }))
}
