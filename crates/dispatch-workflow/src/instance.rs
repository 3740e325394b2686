//! Row-level access to `workflow_instances`.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// Lifecycle state of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Paused,
    Complete,
    Failed,
}

impl WorkflowStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "paused" => Self::Paused,
            "complete" => Self::Complete,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }
}

/// A snapshot of one `workflow_instances` row.
#[derive(Debug, Clone)]
pub struct InstanceRow {
    pub id: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub pending_event_name: Option<String>,
    pub pending_event_deadline: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Insert a fresh `running` instance if one doesn't already exist for
/// `instance_id` (replay re-enters an existing instance untouched).
pub async fn ensure_instance(
    pool: &SqlitePool,
    instance_id: &str,
    name: &str,
    param_blob: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r"
        INSERT INTO workflow_instances (id, name, status, param_blob, created_at, updated_at)
        VALUES (?1, ?2, 'running', ?3, ?4, ?4)
        ON CONFLICT(id) DO NOTHING
        ",
    )
    .bind(instance_id)
    .bind(name)
    .bind(param_blob)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// One non-terminal (`running` or `paused`) instance, enough to redrive
/// its body: the workflow name picks the body function, `param_blob` is
/// the serialized trigger to deserialize and pass back in.
#[derive(Debug, Clone)]
pub struct ResumableInstance {
    pub id: String,
    pub name: String,
    pub param_blob: String,
}

/// Every instance left `running` or `paused`, for the startup sweep that
/// redrives instances orphaned by a process restart.
pub async fn list_resumable(pool: &SqlitePool) -> Result<Vec<ResumableInstance>> {
    let rows = sqlx::query(
        "SELECT id, name, param_blob FROM workflow_instances WHERE status IN ('running', 'paused')",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| {
            Ok(ResumableInstance {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                param_blob: row.try_get("param_blob")?,
            })
        })
        .collect()
}

pub async fn get_instance(pool: &SqlitePool, instance_id: &str) -> Result<Option<InstanceRow>> {
    let row = sqlx::query("SELECT * FROM workflow_instances WHERE id = ?1")
        .bind(instance_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else { return Ok(None) };
    Ok(Some(InstanceRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: WorkflowStatus::from_str(&row.try_get::<String, _>("status")?),
        pending_event_name: row.try_get("pending_event_name")?,
        pending_event_deadline: row
            .try_get::<Option<String>, _>("pending_event_deadline")?
            .map(|s| parse_ts(&s))
            .transpose()?,
        failure_reason: row.try_get("failure_reason")?,
    }))
}

pub async fn set_status(pool: &SqlitePool, instance_id: &str, status: WorkflowStatus) -> Result<()> {
    sqlx::query("UPDATE workflow_instances SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(instance_id)
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_failed(pool: &SqlitePool, instance_id: &str, reason: &str) -> Result<()> {
    sqlx::query(
        "UPDATE workflow_instances SET status = 'failed', failure_reason = ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(instance_id)
    .bind(reason)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_pending_event(
    pool: &SqlitePool,
    instance_id: &str,
    event_name: &str,
    deadline: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE workflow_instances
        SET status = 'paused', pending_event_name = ?2, pending_event_deadline = ?3, updated_at = ?4
        WHERE id = ?1
        ",
    )
    .bind(instance_id)
    .bind(event_name)
    .bind(deadline.to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_pending_event(pool: &SqlitePool, instance_id: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE workflow_instances
        SET status = 'running', pending_event_name = NULL, pending_event_deadline = NULL, updated_at = ?2
        WHERE id = ?1
        ",
    )
    .bind(instance_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)).into())
}
