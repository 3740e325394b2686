//! Assignment Orchestrator (spec.md §4.H): matches ready, unassigned
//! issues to agents and triggers a Development Workflow instance for
//! each match.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dispatch_agents::{match_agent, AgentRegistration};
use dispatch_core::{Issue, IssueId};
use dispatch_dag::DagEngine;
use dispatch_store::IssueStore;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Parameters handed to a freshly-triggered Development Workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentTrigger {
    pub owner: String,
    pub repo: String,
    pub installation_id: i64,
    pub issue_id: IssueId,
    pub agent_id: String,
    pub context: Option<String>,
}

/// What the orchestrator needs from whatever drives Development Workflow
/// instances: start a fresh one, and terminate a stale one on
/// reassignment. Kept as a trait so `assign_ready_issues` doesn't need to
/// know how instances are actually scheduled (spawned locally, queued,
/// whatever the caller prefers).
#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    async fn terminate(&self, instance_id: &str) -> Result<()>;
    fn dispatch(&self, instance_id: String, trigger: DevelopmentTrigger);
}

/// One successful assignment, as returned by [`assign_ready_issues`].
#[derive(Debug, Clone)]
pub struct Assignment {
    pub issue: Issue,
    pub agent_id: String,
    pub confidence: f64,
    pub reason: String,
}

struct ActiveAssignment {
    agent_id: String,
    instance_id: String,
}

/// Tracks, per issue, which Development Workflow instance is currently
/// running for it, so a reassignment to a different agent can terminate
/// the stale instance first (spec.md §4.H step 5). Scoped to this
/// process: a restart starts with an empty table, which is safe because
/// an untracked stale instance simply runs to its own completion or
/// timeout rather than being forcibly stopped, instead of misbehaving.
#[derive(Default)]
pub struct AssignmentOrchestrator {
    active: DashMap<IssueId, ActiveAssignment>,
}

impl AssignmentOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch ready issues from the DAG Engine, match each unassigned one
    /// against `registry`, persist the assignment, and trigger a
    /// Development Workflow instance via `dispatcher`.
    pub async fn assign_ready_issues(
        &self,
        store: &dyn IssueStore,
        registry: &[AgentRegistration],
        dispatcher: &dyn WorkflowDispatcher,
        owner: &str,
        repo: &str,
        installation_id: i64,
    ) -> Result<Vec<Assignment>> {
        let snapshot = store.dag_snapshot().await?;
        let dag = DagEngine::new(&snapshot);
        let ready: Vec<Issue> = dag.ready().into_iter().cloned().collect();

        let mut assignments = Vec::new();
        for issue in ready {
            if issue.assignee.is_some() {
                continue;
            }
            let Some(found) = match_agent(&issue, registry) else {
                continue;
            };

            let mut updated = issue.clone();
            updated.assignee = Some(found.agent_id.clone());
            let updated = store.update_issue(updated).await?;

            let stale_instance = self.active.get(&issue.id).and_then(|existing| {
                (existing.agent_id != found.agent_id).then(|| existing.instance_id.clone())
            });
            if let Some(stale_instance) = stale_instance {
                dispatcher.terminate(&stale_instance).await?;
            }

            let instance_id = format!("dev-{}-{}-{}", issue.id, found.agent_id, Utc::now().timestamp_millis());
            let trigger = DevelopmentTrigger {
                owner: owner.to_string(),
                repo: repo.to_string(),
                installation_id,
                issue_id: issue.id.clone(),
                agent_id: found.agent_id.clone(),
                context: None,
            };
            dispatcher.dispatch(instance_id.clone(), trigger);
            self.active.insert(issue.id.clone(), ActiveAssignment { agent_id: found.agent_id.clone(), instance_id });

            assignments.push(Assignment {
                issue: updated,
                agent_id: found.agent_id,
                confidence: found.confidence,
                reason: found.reason,
            });
        }
        Ok(assignments)
    }
}
