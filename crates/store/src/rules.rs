//! Typed repo for alerting rules.

use chrono::Utc;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use vigil_core::filter::{ListFilter, Page};
use vigil_core::rule::{ActionSpec, Rule};

use crate::error::StoreError;
use crate::filter::{push_conditions, push_ordering, FilterColumns};

const RULE_COLUMNS: &str = "id, name, description, kind, severity, priority, enabled, \
     conditions, actions, tags, metadata, throttle_secs, evaluation_window_secs, group_by, \
     notification_channels, escalation_policy_id, created_by, updated_by, created_at, \
     updated_at, deleted_at, version";

const FILTER_COLUMNS: FilterColumns = FilterColumns {
    equals: &["kind", "severity", "priority", "created_by"],
    search: &["name", "description"],
    sort: &["name", "kind", "severity", "priority", "created_at", "updated_at"],
    default_sort: "created_at",
};

// ── Row mapping ─────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    kind: String,
    severity: String,
    priority: String,
    enabled: bool,
    conditions: serde_json::Value,
    actions: serde_json::Value,
    tags: serde_json::Value,
    metadata: serde_json::Value,
    throttle_secs: Option<i64>,
    evaluation_window_secs: Option<i64>,
    group_by: serde_json::Value,
    notification_channels: serde_json::Value,
    escalation_policy_id: Option<Uuid>,
    created_by: String,
    updated_by: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    deleted_at: Option<chrono::DateTime<Utc>>,
    version: i64,
}

impl TryFrom<RuleRow> for Rule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: String| {
            StoreError::Corrupt(format!("rule {}: bad {what}: {e}", row.id))
        };
        Ok(Rule {
            id: row.id,
            name: row.name,
            description: row.description,
            kind: row.kind,
            severity: row.severity.parse().map_err(|e| corrupt("severity", e))?,
            priority: row.priority.parse().map_err(|e| corrupt("priority", e))?,
            enabled: row.enabled,
            conditions: serde_json::from_value(row.conditions)
                .map_err(|e| corrupt("conditions", e.to_string()))?,
            actions: serde_json::from_value::<Vec<ActionSpec>>(row.actions)
                .map_err(|e| corrupt("actions", e.to_string()))?,
            tags: serde_json::from_value(row.tags).map_err(|e| corrupt("tags", e.to_string()))?,
            metadata: serde_json::from_value(row.metadata)
                .map_err(|e| corrupt("metadata", e.to_string()))?,
            throttle_secs: row.throttle_secs.map(|v| v as u64),
            evaluation_window_secs: row.evaluation_window_secs.map(|v| v as u64),
            group_by: serde_json::from_value(row.group_by)
                .map_err(|e| corrupt("group_by", e.to_string()))?,
            notification_channels: serde_json::from_value(row.notification_channels)
                .map_err(|e| corrupt("notification_channels", e.to_string()))?,
            escalation_policy_id: row.escalation_policy_id,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            version: row.version,
        })
    }
}

fn json(v: &impl serde::Serialize) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(v).map_err(|e| StoreError::InvalidInput(e.to_string()))
}

// ── Repo ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RuleRepo {
    pool: PgPool,
}

impl RuleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new rule. The store owns id, version, and audit
    /// timestamps; a name collision with a live rule is a conflict.
    pub async fn create(&self, mut rule: Rule) -> Result<Rule, StoreError> {
        rule.validate().map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        rule.id = Uuid::new_v4();
        rule.version = 1;
        rule.created_at = Utc::now();
        rule.updated_at = rule.created_at;
        rule.deleted_at = None;

        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "INSERT INTO rules ({RULE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20, $21, $22) \
             RETURNING {RULE_COLUMNS}"
        ))
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.kind)
        .bind(rule.severity.as_str())
        .bind(rule.priority.as_str())
        .bind(rule.enabled)
        .bind(json(&rule.conditions)?)
        .bind(json(&rule.actions)?)
        .bind(json(&rule.tags)?)
        .bind(json(&rule.metadata)?)
        .bind(rule.throttle_secs.map(|v| v as i64))
        .bind(rule.evaluation_window_secs.map(|v| v as i64))
        .bind(json(&rule.group_by)?)
        .bind(json(&rule.notification_channels)?)
        .bind(rule.escalation_policy_id)
        .bind(&rule.created_by)
        .bind(&rule.updated_by)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .bind(rule.deleted_at)
        .bind(rule.version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::on_write(e, format!("rule name '{}' already exists", rule.name)))?;

        row.try_into()
    }

    pub async fn get(&self, id: Uuid) -> Result<Rule, StoreError> {
        sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))?
        .try_into()
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Page<Rule>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE deleted_at IS NULL"
        ));
        push_conditions(&mut qb, filter, &FILTER_COLUMNS)?;
        push_ordering(&mut qb, filter, &FILTER_COLUMNS)?;
        let rows: Vec<RuleRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb =
            QueryBuilder::new("SELECT COUNT(*) FROM rules WHERE deleted_at IS NULL");
        push_conditions(&mut count_qb, filter, &FILTER_COLUMNS)?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let items = rows
            .into_iter()
            .map(Rule::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }

    /// All enabled, live rules, as fed to the cache refresh.
    pub async fn list_enabled(&self) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules \
             WHERE enabled AND deleted_at IS NULL ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Rule::try_from).collect()
    }

    /// Update under optimistic concurrency: `rule.version` must match the
    /// stored version; on success the stored version is `rule.version + 1`.
    pub async fn update(&self, rule: &Rule) -> Result<Rule, StoreError> {
        rule.validate().map_err(|e| StoreError::InvalidInput(e.to_string()))?;

        let updated = sqlx::query_as::<_, RuleRow>(&format!(
            "UPDATE rules SET \
                 name = $3, description = $4, kind = $5, severity = $6, priority = $7, \
                 enabled = $8, conditions = $9, actions = $10, tags = $11, metadata = $12, \
                 throttle_secs = $13, evaluation_window_secs = $14, group_by = $15, \
                 notification_channels = $16, escalation_policy_id = $17, updated_by = $18, \
                 updated_at = NOW(), version = version + 1 \
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL \
             RETURNING {RULE_COLUMNS}"
        ))
        .bind(rule.id)
        .bind(rule.version)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.kind)
        .bind(rule.severity.as_str())
        .bind(rule.priority.as_str())
        .bind(rule.enabled)
        .bind(json(&rule.conditions)?)
        .bind(json(&rule.actions)?)
        .bind(json(&rule.tags)?)
        .bind(json(&rule.metadata)?)
        .bind(rule.throttle_secs.map(|v| v as i64))
        .bind(rule.evaluation_window_secs.map(|v| v as i64))
        .bind(json(&rule.group_by)?)
        .bind(json(&rule.notification_channels)?)
        .bind(rule.escalation_policy_id)
        .bind(&rule.updated_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::on_write(e, format!("rule name '{}' already exists", rule.name)))?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                // Zero rows: either the rule is gone or the version is stale.
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM rules WHERE id = $1 AND deleted_at IS NULL)",
                )
                .bind(rule.id)
                .fetch_one(&self.pool)
                .await?;
                if exists {
                    Err(StoreError::Conflict(format!(
                        "rule {} version {} is stale",
                        rule.id, rule.version
                    )))
                } else {
                    Err(StoreError::NotFound(format!("rule {}", rule.id)))
                }
            }
        }
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE rules SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("rule {id}")));
        }
        Ok(())
    }
}
