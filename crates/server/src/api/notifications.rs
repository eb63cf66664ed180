//! Notification read endpoints plus the provider delivery callback.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use vigil_core::filter::Page;
use vigil_core::notification::Notification;

use crate::api::common::{ApiResult, ListQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    pub channel: Option<String>,
    pub status: Option<String>,
    pub recipient: Option<String>,
    #[serde(flatten)]
    pub common: ListQuery,
}

/// GET /notifications
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationListQuery>,
) -> ApiResult<Json<Page<Notification>>> {
    let mut filter = query.common.into_filter();
    for (column, value) in [
        ("channel", query.channel),
        ("status", query.status),
        ("recipient", query.recipient),
    ] {
        if let Some(value) = value {
            filter.equals.insert(column.to_string(), value);
        }
    }
    Ok(Json(state.store.notifications().list(&filter).await?))
}

/// GET /notifications/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.store.notifications().get(id).await?))
}

/// POST /notifications/{id}/delivered -- provider delivery callback;
/// only legal from `sent`.
pub async fn delivered(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.store.notifications().mark_delivered(id).await?))
}
