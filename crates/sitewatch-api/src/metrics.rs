use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;

use sitewatch_core::history::UPTIME_SAMPLE;
use sitewatch_core::{CheckStatus, SiteId, SiteStatus, TaskState};

use crate::state::AppState;

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(4096);

    let tasks = state.supervisor.tasks().await;
    let now = Utc::now();
    let mut statuses: Vec<SiteStatus> = Vec::with_capacity(tasks.len());
    for (id, _) in &tasks {
        match state.stores().checks.recent_descending(id, UPTIME_SAMPLE).await {
            Ok(recent) => statuses.push(SiteStatus::from_recent(id.clone(), &recent, now)),
            Err(e) => tracing::warn!(site_id = %id, error = %e, "Skipping site in metrics"),
        }
    }

    let running = tasks.iter().filter(|(_, s)| s.is_running()).count();
    writeln!(out, "# TYPE sitewatch_tasks_running gauge").unwrap();
    writeln!(out, "# HELP sitewatch_tasks_running Number of running monitor tasks").unwrap();
    writeln!(out, "sitewatch_tasks_running {}", running).unwrap();

    writeln!(out, "# TYPE sitewatch_task_state stateset").unwrap();
    writeln!(out, "# HELP sitewatch_task_state Current state of each monitor task").unwrap();
    for (id, task_state) in &tasks {
        for variant in [TaskState::Running, TaskState::Stopped] {
            writeln!(
                out,
                "sitewatch_task_state{{site_id=\"{}\",state=\"{}\"}} {}",
                escape(id),
                variant,
                if *task_state == variant { 1 } else { 0 }
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE sitewatch_site_up gauge").unwrap();
    writeln!(out, "# HELP sitewatch_site_up 1 if the latest check was UP, 0 if DOWN").unwrap();
    for s in &statuses {
        if let Some(status) = s.status {
            let up = if status == CheckStatus::Up { 1 } else { 0 };
            writeln!(out, "sitewatch_site_up{{site_id=\"{}\"}} {}", escape(&s.site_id), up).unwrap();
        }
    }

    writeln!(out, "# TYPE sitewatch_site_latency_milliseconds gauge").unwrap();
    writeln!(
        out,
        "# HELP sitewatch_site_latency_milliseconds Response latency of the latest check"
    )
    .unwrap();
    for s in &statuses {
        if let Some(latency) = s.last_check.as_ref().and_then(|c| c.latency_ms) {
            writeln!(
                out,
                "sitewatch_site_latency_milliseconds{{site_id=\"{}\"}} {}",
                escape(&s.site_id),
                latency
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE sitewatch_site_uptime_ratio gauge").unwrap();
    writeln!(
        out,
        "# HELP sitewatch_site_uptime_ratio Share of UP checks among the most recent {}",
        UPTIME_SAMPLE
    )
    .unwrap();
    for s in &statuses {
        if s.last_check.is_some() {
            writeln!(
                out,
                "sitewatch_site_uptime_ratio{{site_id=\"{}\"}} {:.4}",
                escape(&s.site_id),
                s.uptime_percent / 100.0
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE sitewatch_site_last_check_timestamp_seconds gauge").unwrap();
    writeln!(
        out,
        "# HELP sitewatch_site_last_check_timestamp_seconds Unix timestamp of the latest check"
    )
    .unwrap();
    for s in &statuses {
        if let Some(c) = &s.last_check {
            let t = c.timestamp;
            let secs = t.timestamp() as f64 + (t.timestamp_subsec_millis() as f64 / 1000.0);
            writeln!(
                out,
                "sitewatch_site_last_check_timestamp_seconds{{site_id=\"{}\"}} {:.3}",
                escape(&s.site_id),
                secs
            )
            .unwrap();
        }
    }

    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}

fn escape(id: &SiteId) -> String {
    id.as_str()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
