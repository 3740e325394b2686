//! The `Step` handle passed into workflow bodies.

use crate::error::{Result, WorkflowError};
use crate::instance::{self, parse_ts, WorkflowStatus};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Poll granularity for `step.sleep` / `step.wait_for_event`. Short
/// enough that tests complete quickly, coarse enough not to hammer the
/// pool (mirrors the 50ms poll in the teacher's lock-acquisition loop).
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle a workflow body uses to perform durable, replay-safe I/O.
/// One `Step` is constructed per execution of the body (including every
/// replay); the persisted step log is what makes re-execution cheap.
pub struct Step {
    instance_id: String,
    pool: SqlitePool,
    used_names: Mutex<HashSet<String>>,
}

impl Step {
    pub(crate) fn new(instance_id: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            instance_id: instance_id.into(),
            pool,
            used_names: Mutex::new(HashSet::new()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn claim_name(&self, name: &str) -> Result<()> {
        let mut used = self.used_names.lock().expect("step name lock poisoned");
        if !used.insert(name.to_string()) {
            return Err(WorkflowError::DuplicateStep(name.to_string()));
        }
        Ok(())
    }

    async fn find_step_record(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT result_blob FROM step_records WHERE instance_id = ?1 AND step_name = ?2")
            .bind(&self.instance_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<String, _>("result_blob")).transpose()?)
    }

    async fn persist_step_record(&self, name: &str, result_blob: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO step_records (instance_id, step_name, result_blob, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(instance_id, step_name) DO NOTHING
            ",
        )
        .bind(&self.instance_id)
        .bind(name)
        .bind(result_blob)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Run `f` at most once per `(instance, name)`. Replays short-circuit
    /// to the persisted result without calling `f` again.
    pub async fn do_step<T, F, Fut>(&self, name: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.claim_name(name)?;

        if let Some(blob) = self.find_step_record(name).await? {
            return Ok(serde_json::from_str(&blob)?);
        }

        let value = f().await?;
        let blob = serde_json::to_string(&value)?;
        self.persist_step_record(name, &blob).await?;
        Ok(value)
    }

    /// Suspend until `now + duration` has elapsed. On replay after a
    /// restart, if the persisted wakeup time has already passed this
    /// returns immediately.
    pub async fn sleep(&self, name: &str, duration: Duration) -> Result<()> {
        self.claim_name(name)?;

        let wakeup_at = match self.find_step_record(name).await? {
            Some(blob) => parse_ts(&serde_json::from_str::<String>(&blob)?)?,
            None => {
                let wakeup_at = Utc::now() + chrono::Duration::from_std(duration).unwrap_or_default();
                self.persist_step_record(name, &serde_json::to_string(&wakeup_at.to_rfc3339())?)
                    .await?;
                wakeup_at
            }
        };

        loop {
            if Utc::now() >= wakeup_at {
                return Ok(());
            }
            if self.is_terminated().await? {
                return Err(WorkflowError::Terminated);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Suspend until `sendEvent(instance_id, name, payload)` arrives or
    /// `timeout` elapses. On replay, an already-delivered event is
    /// returned without re-waiting.
    pub async fn wait_for_event(&self, name: &str, timeout: Duration) -> Result<serde_json::Value> {
        self.claim_name(name)?;

        if let Some(payload) = self.find_delivered_event(name).await? {
            return Ok(payload);
        }

        let deadline = Utc::now() + chrono::Duration::from_std(timeout).unwrap_or_default();
        instance::set_pending_event(&self.pool, &self.instance_id, name, deadline).await?;

        loop {
            if let Some(payload) = self.find_delivered_event(name).await? {
                instance::clear_pending_event(&self.pool, &self.instance_id).await?;
                return Ok(payload);
            }
            if self.is_terminated().await? {
                return Err(WorkflowError::Terminated);
            }
            if Utc::now() >= deadline {
                return Err(WorkflowError::EventTimeout {
                    event: name.to_string(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_terminated(&self) -> Result<bool> {
        Ok(instance::get_instance(&self.pool, &self.instance_id)
            .await?
            .map(|row| row.status == WorkflowStatus::Failed && row.failure_reason.as_deref() == Some("terminated"))
            .unwrap_or(false))
    }

    async fn find_delivered_event(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT payload FROM workflow_events WHERE instance_id = ?1 AND event_name = ?2")
            .bind(&self.instance_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let payload: String = r.try_get("payload")?;
            Ok::<_, WorkflowError>(serde_json::from_str(&payload)?)
        })
        .transpose()
    }
}
