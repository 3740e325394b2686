//! Instance lifecycle: starting, observing, cancelling and delivering
//! events to workflow instances, plus the `run_workflow` entry point
//! that drives one body to completion (or replay-resumes it).

use crate::error::{Result, WorkflowError};
use crate::instance::{self, ResumableInstance, WorkflowStatus};
use crate::schema::SCHEMA;
use crate::step::Step;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::future::Future;

/// Handle onto the durable step runtime's storage. Shares a pool with
/// the rest of the system when constructed via [`WorkflowRuntime::with_pool`];
/// [`WorkflowRuntime::connect`] is for standalone use and tests.
#[derive(Clone)]
pub struct WorkflowRuntime {
    pool: SqlitePool,
}

impl WorkflowRuntime {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn status(&self, instance_id: &str) -> Result<Option<WorkflowStatus>> {
        Ok(instance::get_instance(&self.pool, instance_id).await?.map(|row| row.status))
    }

    /// Every instance left `running` or `paused` — candidates for a
    /// startup sweep to redrive after a process restart (spec.md §1,
    /// scenario 6: "crash before review; on restart, workflow replays").
    pub async fn list_resumable(&self) -> Result<Vec<ResumableInstance>> {
        instance::list_resumable(&self.pool).await
    }

    /// Deliver `payload` for `(instance_id, name)`. Idempotent: a second
    /// delivery of the same name is dropped.
    pub async fn send_event(&self, instance_id: &str, name: &str, payload: serde_json::Value) -> Result<()> {
        let payload_json = serde_json::to_string(&payload)?;
        sqlx::query(
            r"
            INSERT INTO workflow_events (instance_id, event_name, payload, delivered_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(instance_id, event_name) DO NOTHING
            ",
        )
        .bind(instance_id)
        .bind(name)
        .bind(payload_json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        tracing::debug!(instance_id, event = name, "event delivered");
        Ok(())
    }

    /// Transition `instance_id` to `failed` with cause `Terminated`. A
    /// running step's in-flight return value is discarded by the caller
    /// not observing it; a paused `wait_for_event`/`sleep` notices on its
    /// next poll.
    pub async fn terminate(&self, instance_id: &str) -> Result<()> {
        instance::set_failed(&self.pool, instance_id, "terminated").await?;
        tracing::info!(instance_id, "workflow instance terminated");
        Ok(())
    }
}

/// Start (or replay-resume) a workflow instance and drive `body` to
/// completion. `instance_id` must be deterministic in the trigger so
/// replays and genuinely-new instances are distinguishable by the
/// caller (spec for the Assignment Orchestrator: `(issue_id, agent_id)`
/// plus a timestamp disambiguator for reassignments).
pub async fn run_workflow<P, O, F, Fut>(
    runtime: &WorkflowRuntime,
    instance_id: &str,
    workflow_name: &str,
    params: P,
    body: F,
) -> Result<O>
where
    P: Serialize,
    O: Serialize + DeserializeOwned,
    F: FnOnce(Step, P) -> Fut,
    Fut: Future<Output = Result<O>>,
{
    let param_blob = serde_json::to_string(&params)?;
    instance::ensure_instance(&runtime.pool, instance_id, workflow_name, &param_blob).await?;

    if let Some(existing) = instance::get_instance(&runtime.pool, instance_id).await? {
        if existing.status == WorkflowStatus::Failed {
            return Err(WorkflowError::StepFailed(
                existing.failure_reason.unwrap_or_else(|| "instance already failed".to_string()),
            ));
        }
    }

    let step = Step::new(instance_id, runtime.pool.clone());
    match body(step, params).await {
        Ok(output) => {
            instance::set_status(&runtime.pool, instance_id, WorkflowStatus::Complete).await?;
            Ok(output)
        }
        Err(WorkflowError::Terminated) => Err(WorkflowError::Terminated),
        Err(e) => {
            instance::set_failed(&runtime.pool, instance_id, &e.to_string()).await?;
            Err(e)
        }
    }
}
