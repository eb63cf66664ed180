//! Liveness and statistics readers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::api::common::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub uptime_secs: i64,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

#[derive(Serialize)]
pub struct Stats {
    pub alerts_by_status: Vec<StatusCount>,
    pub notifications_by_status: Vec<StatusCount>,
}

#[derive(Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// GET /stats -- entity counts grouped by status.
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Stats>> {
    let alerts = state
        .store
        .alerts()
        .count_by_status()
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect();
    let notifications = state
        .store
        .notifications()
        .count_by_status()
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect();
    Ok(Json(Stats {
        alerts_by_status: alerts,
        notifications_by_status: notifications,
    }))
}
