//! [`WorkflowDispatcher`] implementation that runs Development Workflow
//! instances as detached `tokio::spawn` tasks against the shared
//! [`WorkflowRuntime`], the same fire-and-forget shape
//! `axon::commands::runtime_manager` uses for agent tasks.

use async_trait::async_trait;
use dispatch_orchestrator::{DevelopmentDeps, DevelopmentTrigger, OrchestratorError, WorkflowDispatcher};
use dispatch_workflow::WorkflowRuntime;
use std::sync::Arc;

pub struct TokioDispatcher {
    runtime: Arc<WorkflowRuntime>,
    deps: DevelopmentDeps,
}

impl TokioDispatcher {
    pub fn new(runtime: Arc<WorkflowRuntime>, deps: DevelopmentDeps) -> Self {
        Self { runtime, deps }
    }
}

#[async_trait]
impl WorkflowDispatcher for TokioDispatcher {
    async fn terminate(&self, instance_id: &str) -> dispatch_orchestrator::Result<()> {
        self.runtime.terminate(instance_id).await.map_err(OrchestratorError::from)?;
        Ok(())
    }

    fn dispatch(&self, instance_id: String, trigger: DevelopmentTrigger) {
        let runtime = self.runtime.clone();
        let deps = self.deps.clone();
        tokio::spawn(async move {
            let issue_id = trigger.issue_id.clone();
            match dispatch_orchestrator::start_development_workflow(&runtime, &instance_id, deps, trigger).await {
                Ok(outcome) => tracing::info!(%instance_id, %issue_id, ?outcome, "development workflow finished"),
                Err(err) => tracing::error!(%instance_id, %issue_id, %err, "development workflow failed"),
            }
        });
    }
}

impl TokioDispatcher {
    /// Redrive every `running`/`paused` Development Workflow instance left
    /// behind by a prior process (spec.md §1: "a durable, resumable
    /// workflow engine ... without holding resources"; scenario 6: "crash
    /// before review; on restart, workflow replays"). `run_workflow`'s own
    /// `ensure_instance`-then-replay-from-the-top behavior makes calling
    /// `dispatch` again with the same instance id and trigger a genuine
    /// resume, not a fresh start.
    pub async fn resume_pending(&self) -> anyhow::Result<usize> {
        let instances = self.runtime.list_resumable().await?;
        let mut resumed = 0;
        for instance in instances {
            if instance.name != "development" {
                tracing::warn!(instance_id = %instance.id, workflow = %instance.name, "no resume handler for this workflow kind, leaving it paused");
                continue;
            }
            match serde_json::from_str::<DevelopmentTrigger>(&instance.param_blob) {
                Ok(trigger) => {
                    tracing::info!(instance_id = %instance.id, issue_id = %trigger.issue_id, "resuming development workflow instance after restart");
                    self.dispatch(instance.id, trigger);
                    resumed += 1;
                }
                Err(err) => tracing::error!(instance_id = %instance.id, %err, "failed to decode trigger for resumable instance"),
            }
        }
        Ok(resumed)
    }
}
