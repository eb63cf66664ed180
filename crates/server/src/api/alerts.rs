//! Alert endpoints: list/get, manual creation, and the lifecycle
//! transitions.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use vigil_bus::EventRef;
use vigil_core::alert::Alert;
use vigil_core::filter::Page;
use vigil_core::rule::{Priority, Severity};
use vigil_engine::AlertDraft;

use crate::api::common::{ApiResult, ListQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertListQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub kind: Option<String>,
    pub source: Option<String>,
    pub correlation_id: Option<String>,
    pub assigned_to: Option<String>,
    #[serde(flatten)]
    pub common: ListQuery,
}

/// GET /alerts
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertListQuery>,
) -> ApiResult<Json<Page<Alert>>> {
    let mut filter = query.common.into_filter();
    for (column, value) in [
        ("status", query.status),
        ("severity", query.severity),
        ("kind", query.kind),
        ("source", query.source),
        ("correlation_id", query.correlation_id),
        ("assigned_to", query.assigned_to),
    ] {
        if let Some(value) = value {
            filter.equals.insert(column.to_string(), value);
        }
    }
    Ok(Json(state.store.alerts().list(&filter).await?))
}

/// GET /alerts/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Alert>> {
    Ok(Json(state.store.alerts().get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub kind: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub priority: Priority,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source: String,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// POST /alerts -- manual creation; goes through deduplication exactly
/// like a rule-created alert.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAlertRequest>,
) -> ApiResult<(StatusCode, Json<Alert>)> {
    let draft = AlertDraft {
        rule_id: None,
        kind: request.kind,
        severity: request.severity,
        priority: request.priority,
        title: request.title,
        description: request.description,
        source: request.source,
        event_payload: serde_json::json!({}),
        entity_ids: request.entity_ids,
        tags: request.tags,
        metadata: request.metadata,
        escalation_policy_id: None,
        initial_escalation_level: 0,
    };
    let outcome = state.lifecycle.ingest(draft, &[], EventRef::default()).await?;
    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.alert().clone())))
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /alerts/{id}/acknowledge
pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<Json<Alert>> {
    Ok(Json(state.lifecycle.acknowledge(id, &request.actor).await?))
}

/// POST /alerts/{id}/resolve
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> ApiResult<Json<Alert>> {
    Ok(Json(
        state
            .lifecycle
            .resolve(id, &request.actor, request.reason.as_deref())
            .await?,
    ))
}

/// POST /alerts/{id}/escalate
pub async fn escalate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Alert>> {
    Ok(Json(state.lifecycle.escalate(id, EventRef::default()).await?))
}

/// DELETE /alerts/{id} -- archive (soft delete), legal from any status.
pub async fn archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.alerts().archive(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
