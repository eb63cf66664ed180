//! Escalation-policy CRUD endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use vigil_core::filter::Page;
use vigil_core::policy::{EscalationPolicy, EscalationStep};

use crate::api::common::{ApiResult, ListQuery};
use crate::state::AppState;

/// GET /escalation-policies
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<EscalationPolicy>>> {
    let filter = query.into_filter();
    Ok(Json(state.store.policies().list(&filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub steps: Vec<EscalationStep>,
    #[serde(default)]
    pub rule_conditions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// POST /escalation-policies
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePolicyRequest>,
) -> ApiResult<(StatusCode, Json<EscalationPolicy>)> {
    let now = Utc::now();
    let policy = EscalationPolicy {
        id: Uuid::nil(), // store assigns
        name: request.name,
        description: request.description,
        enabled: request.enabled,
        steps: request.steps,
        rule_conditions: request.rule_conditions,
        tags: request.tags,
        metadata: request.metadata,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        version: 1,
    };
    let created = state.store.policies().create(policy).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /escalation-policies/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EscalationPolicy>> {
    Ok(Json(state.store.policies().get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePolicyRequest {
    pub version: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub steps: Option<Vec<EscalationStep>>,
    #[serde(default)]
    pub rule_conditions: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// PUT /escalation-policies/{id} -- optimistic-concurrency update.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePolicyRequest>,
) -> ApiResult<Json<EscalationPolicy>> {
    let mut policy = state.store.policies().get(id).await?;
    policy.version = request.version;
    if let Some(name) = request.name {
        policy.name = name;
    }
    if let Some(description) = request.description {
        policy.description = Some(description);
    }
    if let Some(enabled) = request.enabled {
        policy.enabled = enabled;
    }
    if let Some(steps) = request.steps {
        policy.steps = steps;
    }
    if let Some(conditions) = request.rule_conditions {
        policy.rule_conditions = conditions;
    }
    if let Some(tags) = request.tags {
        policy.tags = tags;
    }
    Ok(Json(state.store.policies().update(&policy).await?))
}

/// DELETE /escalation-policies/{id} -- soft delete.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.policies().soft_delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
