//! Typed repo for alerts, including the state-machine transitions and
//! the sweep queries the scheduler runs.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use vigil_core::alert::{Alert, AlertStatus};
use vigil_core::filter::{ListFilter, Page};

use crate::error::StoreError;
use crate::filter::{push_conditions, push_ordering, FilterColumns};

const ALERT_COLUMNS: &str = "id, rule_id, kind, severity, priority, status, title, description, \
     source, event_payload, entity_ids, tags, metadata, fingerprint, correlation_id, \
     parent_alert_id, escalation_level, escalation_policy_id, assigned_to, notification_sent, \
     expires_at, created_at, updated_at, deleted_at, acknowledged_at, acknowledged_by, \
     resolved_at, resolved_by, resolution_reason, escalated_at";

const FILTER_COLUMNS: FilterColumns = FilterColumns {
    equals: &["kind", "severity", "priority", "status", "source", "correlation_id", "assigned_to"],
    search: &["title", "description"],
    sort: &["severity", "priority", "status", "created_at", "updated_at", "escalation_level"],
    default_sort: "created_at",
};

const NON_TERMINAL: &str = "('open', 'acknowledged', 'escalated')";

// ── Row mapping ─────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    rule_id: Option<Uuid>,
    kind: String,
    severity: String,
    priority: String,
    status: String,
    title: String,
    description: Option<String>,
    source: String,
    event_payload: serde_json::Value,
    entity_ids: serde_json::Value,
    tags: serde_json::Value,
    metadata: serde_json::Value,
    fingerprint: String,
    correlation_id: Option<String>,
    parent_alert_id: Option<Uuid>,
    escalation_level: i32,
    escalation_policy_id: Option<Uuid>,
    assigned_to: Option<String>,
    notification_sent: bool,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    acknowledged_at: Option<DateTime<Utc>>,
    acknowledged_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolution_reason: Option<String>,
    escalated_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: String| {
            StoreError::Corrupt(format!("alert {}: bad {what}: {e}", row.id))
        };
        Ok(Alert {
            id: row.id,
            rule_id: row.rule_id,
            kind: row.kind,
            severity: row.severity.parse().map_err(|e| corrupt("severity", e))?,
            priority: row.priority.parse().map_err(|e| corrupt("priority", e))?,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            title: row.title,
            description: row.description,
            source: row.source,
            event_payload: row.event_payload,
            entity_ids: serde_json::from_value(row.entity_ids)
                .map_err(|e| corrupt("entity_ids", e.to_string()))?,
            tags: serde_json::from_value(row.tags).map_err(|e| corrupt("tags", e.to_string()))?,
            metadata: serde_json::from_value(row.metadata)
                .map_err(|e| corrupt("metadata", e.to_string()))?,
            fingerprint: row.fingerprint,
            correlation_id: row.correlation_id,
            parent_alert_id: row.parent_alert_id,
            escalation_level: row.escalation_level,
            escalation_policy_id: row.escalation_policy_id,
            assigned_to: row.assigned_to,
            notification_sent: row.notification_sent,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            acknowledged_at: row.acknowledged_at,
            acknowledged_by: row.acknowledged_by,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolution_reason: row.resolution_reason,
            escalated_at: row.escalated_at,
        })
    }
}

fn json(v: &impl serde::Serialize) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(v).map_err(|e| StoreError::InvalidInput(e.to_string()))
}

/// Outcome of a deduplicated insert.
#[derive(Debug)]
pub enum DedupOutcome {
    /// No live alert shared the fingerprint; a new row was inserted.
    Created(Alert),
    /// An existing alert absorbed the occurrence.
    Merged(Alert),
}

impl DedupOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            DedupOutcome::Created(a) | DedupOutcome::Merged(a) => a,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, DedupOutcome::Created(_))
    }
}

// ── Repo ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AlertRepo {
    pool: PgPool,
}

impl AlertRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Plain insert, no deduplication (manual alert creation).
    pub async fn create(&self, mut alert: Alert) -> Result<Alert, StoreError> {
        alert.id = Uuid::new_v4();
        alert.created_at = Utc::now();
        alert.updated_at = alert.created_at;
        alert.deleted_at = None;
        let row = insert_alert(&self.pool, &alert).await?;
        row.try_into()
    }

    /// Deduplicated insert: inside one transaction, look for a live
    /// alert with the same fingerprint inside the window (row-locked),
    /// merge into it if found, insert otherwise.
    ///
    /// Concurrent calls with equal fingerprints serialize on the row
    /// lock, so exactly one insert wins and the rest merge.
    pub async fn create_deduplicated(
        &self,
        mut alert: Alert,
        window: Duration,
    ) -> Result<DedupOutcome, StoreError> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        let cutoff = Utc::now() - window;

        let existing: Option<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT id FROM alerts \
             WHERE fingerprint = $1 AND created_at > $2 \
               AND status IN {NON_TERMINAL} AND deleted_at IS NULL \
             ORDER BY created_at DESC LIMIT 1 \
             FOR UPDATE"
        ))
        .bind(&alert.fingerprint)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some((id,)) => {
                let row = sqlx::query_as::<_, AlertRow>(&format!(
                    "UPDATE alerts SET \
                         metadata = jsonb_set( \
                             jsonb_set(metadata, '{{{occ}}}', \
                                 to_jsonb(COALESCE((metadata->>'{occ}')::bigint, 1) + 1)), \
                             '{{{last}}}', to_jsonb(NOW())), \
                         updated_at = NOW() \
                     WHERE id = $1 \
                     RETURNING {ALERT_COLUMNS}",
                    occ = Alert::OCCURRENCE_KEY,
                    last = Alert::LAST_OCCURRED_KEY,
                ))
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
                DedupOutcome::Merged(row.try_into()?)
            }
            None => {
                alert.id = Uuid::new_v4();
                alert.created_at = Utc::now();
                alert.updated_at = alert.created_at;
                alert.deleted_at = None;
                alert
                    .metadata
                    .entry(Alert::OCCURRENCE_KEY.to_string())
                    .or_insert_with(|| serde_json::json!(1));
                let row = insert_alert(&mut *tx, &alert).await?;
                DedupOutcome::Created(row.try_into()?)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn get(&self, id: Uuid) -> Result<Alert, StoreError> {
        sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?
        .try_into()
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Page<Alert>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE deleted_at IS NULL"
        ));
        push_conditions(&mut qb, filter, &FILTER_COLUMNS)?;
        push_ordering(&mut qb, filter, &FILTER_COLUMNS)?;
        let rows: Vec<AlertRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb =
            QueryBuilder::new("SELECT COUNT(*) FROM alerts WHERE deleted_at IS NULL");
        push_conditions(&mut count_qb, filter, &FILTER_COLUMNS)?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let items = rows
            .into_iter()
            .map(Alert::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }

    /// Live (non-terminal) alert with this fingerprint inside the window.
    pub async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
        window: Duration,
    ) -> Result<Option<Alert>, StoreError> {
        let cutoff = Utc::now() - window;
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE fingerprint = $1 AND created_at > $2 \
               AND status IN {NON_TERMINAL} AND deleted_at IS NULL \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(fingerprint)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Alert::try_from).transpose()
    }

    // ── Transitions ─────────────────────────────────────────────

    /// `open → acknowledged`. Exactly one of two concurrent calls
    /// succeeds; the loser sees `Conflict` (or `NotFound` if archived).
    pub async fn acknowledge(&self, id: Uuid, actor: &str) -> Result<Alert, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "UPDATE alerts SET status = 'acknowledged', acknowledged_at = NOW(), \
                 acknowledged_by = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'open' AND deleted_at IS NULL \
             RETURNING {ALERT_COLUMNS}"
        ))
        .bind(id)
        .bind(actor)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_failure(id, "acknowledge").await?),
        }
    }

    /// `open|acknowledged|escalated → resolved`.
    pub async fn resolve(
        &self,
        id: Uuid,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Alert, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "UPDATE alerts SET status = 'resolved', resolved_at = NOW(), resolved_by = $2, \
                 resolution_reason = $3, updated_at = NOW() \
             WHERE id = $1 AND status IN {NON_TERMINAL} AND deleted_at IS NULL \
             RETURNING {ALERT_COLUMNS}"
        ))
        .bind(id)
        .bind(actor)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_failure(id, "resolve").await?),
        }
    }

    /// `open|escalated → escalated`, bumping the level while it stays
    /// under `max_level`.
    pub async fn escalate(&self, id: Uuid, max_level: i32) -> Result<Alert, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "UPDATE alerts SET status = 'escalated', escalation_level = escalation_level + 1, \
                 escalated_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status IN ('open', 'escalated') \
               AND escalation_level < $2 AND deleted_at IS NULL \
             RETURNING {ALERT_COLUMNS}"
        ))
        .bind(id)
        .bind(max_level)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_failure(id, "escalate").await?),
        }
    }

    /// Distinguish `NotFound` from an illegal-state `Conflict` after a
    /// zero-row transition update.
    async fn transition_failure(&self, id: Uuid, verb: &str) -> Result<StoreError, StoreError> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM alerts WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match status {
            None => StoreError::NotFound(format!("alert {id}")),
            Some((status,)) => {
                StoreError::Conflict(format!("cannot {verb} alert {id} in status '{status}'"))
            }
        })
    }

    pub async fn set_notification_sent(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE alerts SET notification_sent = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Archive (soft-delete). Legal from any status.
    pub async fn archive(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE alerts SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }

    // ── Sweeps ──────────────────────────────────────────────────

    /// Move past-due non-terminal alerts to `expired`, returning them
    /// so the caller can publish lifecycle events.
    pub async fn expire_due(&self) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "UPDATE alerts SET status = 'expired', updated_at = NOW() \
             WHERE status IN {NON_TERMINAL} AND expires_at <= NOW() AND deleted_at IS NULL \
             RETURNING {ALERT_COLUMNS}"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Alert::try_from).collect()
    }

    /// Alerts due another escalation step: open or already escalated,
    /// older than the interval, whose last escalation (if any) is also
    /// older than the interval, and still under the level cap.
    pub async fn list_for_escalation(
        &self,
        interval: Duration,
        max_level: i32,
    ) -> Result<Vec<Alert>, StoreError> {
        let cutoff = Utc::now() - interval;
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE status IN ('open', 'escalated') \
               AND created_at < $1 \
               AND (escalated_at IS NULL OR escalated_at < $1) \
               AND escalation_level < $2 \
               AND deleted_at IS NULL \
             ORDER BY created_at"
        ))
        .bind(cutoff)
        .bind(max_level)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Alert::try_from).collect()
    }

    /// Hard-delete alerts older than the retention horizon. Returns the
    /// number of rows removed. Notifications keep their `alert_id`.
    pub async fn cleanup_older_than(&self, days: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM alerts WHERE created_at < NOW() - make_interval(days => $1::int)",
        )
        .bind(days)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Status → count, for the stats endpoint.
    pub async fn count_by_status(&self) -> Result<Vec<(AlertStatus, i64)>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM alerts WHERE deleted_at IS NULL GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(status, count)| {
                status
                    .parse()
                    .map(|s| (s, count))
                    .map_err(|e: String| StoreError::Corrupt(e))
            })
            .collect()
    }
}

/// Shared insert used by both plain and deduplicated creation.
async fn insert_alert<'e, E>(executor: E, alert: &Alert) -> Result<AlertRow, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, AlertRow>(&format!(
        "INSERT INTO alerts ({ALERT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                 $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30) \
         RETURNING {ALERT_COLUMNS}"
    ))
    .bind(alert.id)
    .bind(alert.rule_id)
    .bind(&alert.kind)
    .bind(alert.severity.as_str())
    .bind(alert.priority.as_str())
    .bind(alert.status.as_str())
    .bind(&alert.title)
    .bind(&alert.description)
    .bind(&alert.source)
    .bind(&alert.event_payload)
    .bind(json(&alert.entity_ids)?)
    .bind(json(&alert.tags)?)
    .bind(json(&alert.metadata)?)
    .bind(&alert.fingerprint)
    .bind(&alert.correlation_id)
    .bind(alert.parent_alert_id)
    .bind(alert.escalation_level)
    .bind(alert.escalation_policy_id)
    .bind(&alert.assigned_to)
    .bind(alert.notification_sent)
    .bind(alert.expires_at)
    .bind(alert.created_at)
    .bind(alert.updated_at)
    .bind(alert.deleted_at)
    .bind(alert.acknowledged_at)
    .bind(&alert.acknowledged_by)
    .bind(alert.resolved_at)
    .bind(&alert.resolved_by)
    .bind(&alert.resolution_reason)
    .bind(alert.escalated_at)
    .fetch_one(executor)
    .await
    .map_err(StoreError::Database)
}
