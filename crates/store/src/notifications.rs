//! Typed repo for notifications and their delivery-status transitions.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use vigil_core::filter::{ListFilter, Page};
use vigil_core::notification::{Channel, Notification, NotificationStatus};

use crate::error::StoreError;
use crate::filter::{push_conditions, push_ordering, FilterColumns};

const NOTIFICATION_COLUMNS: &str = "id, alert_id, rule_id, channel, recipient, subject, content, \
     priority, status, scheduled_at, sent_at, delivered_at, failed_at, retry_count, max_retries, \
     last_error, external_id, tracking_id, created_at, updated_at";

const FILTER_COLUMNS: FilterColumns = FilterColumns {
    equals: &["channel", "status", "priority", "recipient"],
    search: &["subject", "recipient"],
    sort: &["channel", "status", "priority", "scheduled_at", "created_at"],
    default_sort: "created_at",
};

/// SQL rank for priority so `ORDER BY … DESC` matches the enum order.
const PRIORITY_RANK: &str =
    "CASE priority WHEN 'critical' THEN 4 WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END";

// ── Row mapping ─────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    alert_id: Uuid,
    rule_id: Option<Uuid>,
    channel: String,
    recipient: String,
    subject: String,
    content: String,
    priority: String,
    status: String,
    scheduled_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    last_error: Option<String>,
    external_id: Option<String>,
    tracking_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: String| {
            StoreError::Corrupt(format!("notification {}: bad {what}: {e}", row.id))
        };
        Ok(Notification {
            id: row.id,
            alert_id: row.alert_id,
            rule_id: row.rule_id,
            channel: row.channel.parse().map_err(|e| corrupt("channel", e))?,
            recipient: row.recipient,
            subject: row.subject,
            content: row.content,
            priority: row.priority.parse().map_err(|e| corrupt("priority", e))?,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            scheduled_at: row.scheduled_at,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            failed_at: row.failed_at,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            last_error: row.last_error,
            external_id: row.external_id,
            tracking_id: row.tracking_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ── Repo ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct NotificationRepo {
    pool: PgPool,
}

impl NotificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, mut notification: Notification) -> Result<Notification, StoreError> {
        notification.id = Uuid::new_v4();
        notification.created_at = Utc::now();
        notification.updated_at = notification.created_at;

        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20) \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(notification.id)
        .bind(notification.alert_id)
        .bind(notification.rule_id)
        .bind(notification.channel.as_str())
        .bind(&notification.recipient)
        .bind(&notification.subject)
        .bind(&notification.content)
        .bind(notification.priority.as_str())
        .bind(notification.status.as_str())
        .bind(notification.scheduled_at)
        .bind(notification.sent_at)
        .bind(notification.delivered_at)
        .bind(notification.failed_at)
        .bind(notification.retry_count)
        .bind(notification.max_retries)
        .bind(&notification.last_error)
        .bind(&notification.external_id)
        .bind(&notification.tracking_id)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    pub async fn get(&self, id: Uuid) -> Result<Notification, StoreError> {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("notification {id}")))?
        .try_into()
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Page<Notification>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE TRUE"
        ));
        push_conditions(&mut qb, filter, &FILTER_COLUMNS)?;
        push_ordering(&mut qb, filter, &FILTER_COLUMNS)?;
        let rows: Vec<NotificationRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM notifications WHERE TRUE");
        push_conditions(&mut count_qb, filter, &FILTER_COLUMNS)?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }

    /// The next due sends for a channel, strictly ordered by
    /// `(priority desc, scheduled_at asc, created_at asc)`.
    ///
    /// Rows already holding an `external_id` were handed to the provider
    /// on a previous run and are skipped, which keeps reruns idempotent.
    /// The `mark_sent` status guard rejects double-claims, so a stale
    /// read here costs a wasted attempt, never a duplicate send.
    pub async fn next_batch_due(
        &self,
        channel: Channel,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE channel = $1 AND status IN ('pending', 'retry') \
               AND scheduled_at <= NOW() AND external_id IS NULL \
             ORDER BY {PRIORITY_RANK} DESC, scheduled_at ASC, created_at ASC \
             LIMIT $2"
        ))
        .bind(channel.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    /// `pending|retry → sent`, recording the provider's external id.
    pub async fn mark_sent(&self, id: Uuid, external_id: &str) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE notifications SET status = 'sent', sent_at = NOW(), external_id = $2, \
                 updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'retry') \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_failure(id, "sent").await?),
        }
    }

    /// `sent → delivered`, on a provider delivery callback.
    pub async fn mark_delivered(&self, id: Uuid) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE notifications SET status = 'delivered', delivered_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'sent' \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_failure(id, "delivered").await?),
        }
    }

    /// Record a failed attempt and schedule the next one. Guarded so
    /// `retry_count` can never exceed `max_retries`.
    pub async fn mark_retry(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE notifications SET status = 'retry', retry_count = retry_count + 1, \
                 last_error = $2, scheduled_at = $3, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'retry') AND retry_count < max_retries \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_failure(id, "retry").await?),
        }
    }

    /// Terminal failure after retries exhaust (or a permanent reject).
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE notifications SET status = 'failed', failed_at = NOW(), last_error = $2, \
                 updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ('delivered', 'failed') \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.transition_failure(id, "failed").await?),
        }
    }

    async fn transition_failure(&self, id: Uuid, target: &str) -> Result<StoreError, StoreError> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match status {
            None => StoreError::NotFound(format!("notification {id}")),
            Some((status,)) => StoreError::Conflict(format!(
                "cannot move notification {id} from '{status}' to '{target}'"
            )),
        })
    }

    pub async fn cleanup_older_than(&self, days: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE created_at < NOW() - make_interval(days => $1::int)",
        )
        .bind(days)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_status(&self) -> Result<Vec<(NotificationStatus, i64)>, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM notifications GROUP BY status")
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
