use axum::extract::State;
use axum::Json;

use sitewatch_core::SweepReport;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/v1/sweep
///
/// One immediate check of every active site. Responds once all of them
/// have finished.
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    let report = state.supervisor.sweep().await?;
    Ok(Json(report))
}
