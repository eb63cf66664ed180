//! Typed repo for escalation policies.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use vigil_core::filter::{ListFilter, Page};
use vigil_core::policy::{EscalationPolicy, EscalationStep};

use crate::error::StoreError;
use crate::filter::{push_conditions, push_ordering, FilterColumns};

const POLICY_COLUMNS: &str = "id, name, description, enabled, steps, rule_conditions, tags, \
     metadata, created_at, updated_at, deleted_at, version";

const FILTER_COLUMNS: FilterColumns = FilterColumns {
    equals: &["name"],
    search: &["name", "description"],
    sort: &["name", "created_at", "updated_at"],
    default_sort: "created_at",
};

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    enabled: bool,
    steps: serde_json::Value,
    rule_conditions: serde_json::Value,
    tags: serde_json::Value,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<PolicyRow> for EscalationPolicy {
    type Error = StoreError;

    fn try_from(row: PolicyRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: String| {
            StoreError::Corrupt(format!("policy {}: bad {what}: {e}", row.id))
        };
        Ok(EscalationPolicy {
            id: row.id,
            name: row.name,
            description: row.description,
            enabled: row.enabled,
            steps: serde_json::from_value::<Vec<EscalationStep>>(row.steps)
                .map_err(|e| corrupt("steps", e.to_string()))?,
            rule_conditions: serde_json::from_value(row.rule_conditions)
                .map_err(|e| corrupt("rule_conditions", e.to_string()))?,
            tags: serde_json::from_value(row.tags).map_err(|e| corrupt("tags", e.to_string()))?,
            metadata: serde_json::from_value(row.metadata)
                .map_err(|e| corrupt("metadata", e.to_string()))?,
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

#[derive(Clone)]
pub struct PolicyRepo {
    pool: PgPool,
}

impl PolicyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, mut policy: EscalationPolicy) -> Result<EscalationPolicy, StoreError> {
        if policy.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("policy name must not be empty".to_string()));
        }
        if policy.steps.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "policy '{}' has no escalation steps",
                policy.name
            )));
        }
        policy.id = Uuid::new_v4();
        policy.version = 1;
        policy.created_at = Utc::now();
        policy.updated_at = policy.created_at;
        policy.deleted_at = None;

        let row = sqlx::query_as::<_, PolicyRow>(&format!(
            "INSERT INTO escalation_policies ({POLICY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {POLICY_COLUMNS}"
        ))
        .bind(policy.id)
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(policy.enabled)
        .bind(json(&policy.steps)?)
        .bind(json(&policy.rule_conditions)?)
        .bind(json(&policy.tags)?)
        .bind(json(&policy.metadata)?)
        .bind(policy.created_at)
        .bind(policy.updated_at)
        .bind(policy.deleted_at)
        .bind(policy.version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            StoreError::on_write(e, format!("policy name '{}' already exists", policy.name))
        })?;

        row.try_into()
    }

    pub async fn get(&self, id: Uuid) -> Result<EscalationPolicy, StoreError> {
        sqlx::query_as::<_, PolicyRow>(&format!(
            "SELECT {POLICY_COLUMNS} FROM escalation_policies \
             WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("policy {id}")))?
        .try_into()
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Page<EscalationPolicy>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {POLICY_COLUMNS} FROM escalation_policies WHERE deleted_at IS NULL"
        ));
        push_conditions(&mut qb, filter, &FILTER_COLUMNS)?;
        push_ordering(&mut qb, filter, &FILTER_COLUMNS)?;
        let rows: Vec<PolicyRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb = QueryBuilder::new(
            "SELECT COUNT(*) FROM escalation_policies WHERE deleted_at IS NULL",
        );
        push_conditions(&mut count_qb, filter, &FILTER_COLUMNS)?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let items = rows
            .into_iter()
            .map(EscalationPolicy::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }

    /// Optimistic-concurrency update, mirroring the rule repo.
    pub async fn update(&self, policy: &EscalationPolicy) -> Result<EscalationPolicy, StoreError> {
        let updated = sqlx::query_as::<_, PolicyRow>(&format!(
            "UPDATE escalation_policies SET \
                 name = $3, description = $4, enabled = $5, steps = $6, rule_conditions = $7, \
                 tags = $8, metadata = $9, updated_at = NOW(), version = version + 1 \
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL \
             RETURNING {POLICY_COLUMNS}"
        ))
        .bind(policy.id)
        .bind(policy.version)
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(policy.enabled)
        .bind(json(&policy.steps)?)
        .bind(json(&policy.rule_conditions)?)
        .bind(json(&policy.tags)?)
        .bind(json(&policy.metadata)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            StoreError::on_write(e, format!("policy name '{}' already exists", policy.name))
        })?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM escalation_policies \
                     WHERE id = $1 AND deleted_at IS NULL)",
                )
                .bind(policy.id)
                .fetch_one(&self.pool)
                .await?;
                if exists {
                    Err(StoreError::Conflict(format!(
                        "policy {} version {} is stale",
                        policy.id, policy.version
                    )))
                } else {
                    Err(StoreError::NotFound(format!("policy {}", policy.id)))
                }
            }
        }
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE escalation_policies SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("policy {id}")));
        }
        Ok(())
    }
}
