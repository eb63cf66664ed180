//! Rule CRUD endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use vigil_core::filter::Page;
use vigil_core::rule::{ActionSpec, Priority, Rule, Severity};

use crate::api::common::{ApiError, ApiResult, ListQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    pub kind: Option<String>,
    pub severity: Option<String>,
    pub priority: Option<String>,
    #[serde(flatten)]
    pub common: ListQuery,
}

/// GET /rules -- list with filter + pagination.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RuleListQuery>,
) -> ApiResult<Json<Page<Rule>>> {
    let mut filter = query.common.into_filter();
    if let Some(kind) = query.kind {
        filter.equals.insert("kind".to_string(), kind);
    }
    if let Some(severity) = query.severity {
        filter.equals.insert("severity".to_string(), severity);
    }
    if let Some(priority) = query.priority {
        filter.equals.insert("priority".to_string(), priority);
    }
    let page = state.store.rules().list(&filter).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub conditions: Vec<String>,
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub throttle_secs: Option<u64>,
    #[serde(default)]
    pub evaluation_window_secs: Option<u64>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub notification_channels: Vec<String>,
    #[serde(default)]
    pub escalation_policy_id: Option<Uuid>,
    pub created_by: String,
}

fn default_true() -> bool {
    true
}

/// POST /rules -- create a rule. Conditions are compiled at the next
/// cache refresh; malformed ones are rejected here early.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRuleRequest>,
) -> ApiResult<(StatusCode, Json<Rule>)> {
    for (index, condition) in request.conditions.iter().enumerate() {
        vigil_expr::compile(condition, vigil_rules::ENV_ROOTS)
            .map_err(|e| ApiError::bad_request(format!("condition {index}: {e}")))?;
    }

    let now = Utc::now();
    let rule = Rule {
        id: Uuid::nil(), // store assigns
        name: request.name,
        description: request.description,
        kind: request.kind,
        severity: request.severity,
        priority: request.priority,
        enabled: request.enabled,
        conditions: request.conditions,
        actions: request.actions,
        tags: request.tags,
        metadata: request.metadata,
        throttle_secs: request.throttle_secs,
        evaluation_window_secs: request.evaluation_window_secs,
        group_by: request.group_by,
        notification_channels: request.notification_channels,
        escalation_policy_id: request.escalation_policy_id,
        created_by: request.created_by.clone(),
        updated_by: request.created_by,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        version: 1,
    };

    let created = state.store.rules().create(rule).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /rules/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Rule>> {
    Ok(Json(state.store.rules().get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    /// The version the caller read; a stale value is a conflict.
    pub version: i64,
    pub updated_by: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub conditions: Option<Vec<String>>,
    #[serde(default)]
    pub actions: Option<Vec<ActionSpec>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub throttle_secs: Option<u64>,
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    #[serde(default)]
    pub notification_channels: Option<Vec<String>>,
    #[serde(default)]
    pub escalation_policy_id: Option<Uuid>,
}

/// PUT /rules/{id} -- optimistic-concurrency update.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRuleRequest>,
) -> ApiResult<Json<Rule>> {
    if let Some(conditions) = &request.conditions {
        for (index, condition) in conditions.iter().enumerate() {
            vigil_expr::compile(condition, vigil_rules::ENV_ROOTS)
                .map_err(|e| ApiError::bad_request(format!("condition {index}: {e}")))?;
        }
    }

    let mut rule = state.store.rules().get(id).await?;
    rule.version = request.version;
    rule.updated_by = request.updated_by;
    if let Some(name) = request.name {
        rule.name = name;
    }
    if let Some(description) = request.description {
        rule.description = Some(description);
    }
    if let Some(severity) = request.severity {
        rule.severity = severity;
    }
    if let Some(priority) = request.priority {
        rule.priority = priority;
    }
    if let Some(enabled) = request.enabled {
        rule.enabled = enabled;
    }
    if let Some(conditions) = request.conditions {
        rule.conditions = conditions;
    }
    if let Some(actions) = request.actions {
        rule.actions = actions;
    }
    if let Some(tags) = request.tags {
        rule.tags = tags;
    }
    if request.throttle_secs.is_some() {
        rule.throttle_secs = request.throttle_secs;
    }
    if let Some(group_by) = request.group_by {
        rule.group_by = group_by;
    }
    if let Some(channels) = request.notification_channels {
        rule.notification_channels = channels;
    }
    if request.escalation_policy_id.is_some() {
        rule.escalation_policy_id = request.escalation_policy_id;
    }

    Ok(Json(state.store.rules().update(&rule).await?))
}

/// DELETE /rules/{id} -- soft delete.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.rules().soft_delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
