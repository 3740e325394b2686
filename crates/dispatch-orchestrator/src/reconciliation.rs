//! Reconciliation Workflow (spec.md §4.J): periodically re-syncs every
//! repo with sync enabled, so drift from missed or malformed webhooks
//! self-heals without manual intervention.

use dispatch_core::config::{Conventions, RetryConfig, SyncStrategy};
use dispatch_core::{RepoConfig, SyncStatus};
use dispatch_store::IssueStore;
use dispatch_sync::{sync, RemoteTracker, SyncResult};
use dispatch_workflow::{run_workflow, Step, WorkflowRuntime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationParams {
    pub strategy: SyncStrategy,
}

/// Per-repo result, named so a partial failure in one repo never loses
/// the results already gathered for the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub repo: String,
    pub created: usize,
    pub updated: usize,
    pub conflicts: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub reports: Vec<ReconciliationReport>,
}

#[derive(Clone)]
pub struct ReconciliationDeps {
    pub store: Arc<dyn IssueStore>,
    pub tracker: Arc<dyn RemoteTracker>,
    pub conventions: Conventions,
    pub retry_config: RetryConfig,
}

pub async fn run_reconciliation_workflow(
    runtime: &WorkflowRuntime,
    instance_id: &str,
    deps: ReconciliationDeps,
    params: ReconciliationParams,
) -> Result<ReconciliationOutcome> {
    let outcome = run_workflow(runtime, instance_id, "reconciliation", params, move |step, params| {
        reconciliation_workflow_body(step, params, deps)
    })
    .await?;
    Ok(outcome)
}

async fn reconciliation_workflow_body(
    step: Step,
    params: ReconciliationParams,
    deps: ReconciliationDeps,
) -> dispatch_workflow::Result<ReconciliationOutcome> {
    let store = deps.store;
    let tracker = deps.tracker;
    let conventions = deps.conventions;
    let retry_config = deps.retry_config;
    let strategy = params.strategy;

    let repos: Vec<RepoConfig> = {
        let store = store.clone();
        step.do_step("fetch-repos", move || async move {
            let repos = store.list_repos(true).await.map_err(OrchestratorError::from)?;
            Ok(repos)
        })
        .await?
    };

    let mut reports = Vec::with_capacity(repos.len());
    for repo in repos {
        let store = store.clone();
        let tracker = tracker.clone();
        let conventions = conventions.clone();
        let full_name = repo.full_name();
        let step_name = format!("sync-repo-{full_name}");

        let report = step
            .do_step(&step_name, move || async move {
                let result = sync_one_repo(&repo, &store, tracker.as_ref(), &conventions, &retry_config, strategy).await;
                record_sync_status(&repo, &result, &store).await.map_err(OrchestratorError::from)?;
                let report = match result {
                    Ok(result) => ReconciliationReport {
                        repo: full_name.clone(),
                        created: result.created.len(),
                        updated: result.updated.len(),
                        conflicts: result.conflicts.len(),
                        errors: result.errors.len(),
                    },
                    Err(_) => ReconciliationReport { repo: full_name.clone(), created: 0, updated: 0, conflicts: 0, errors: 1 },
                };
                Ok(report)
            })
            .await?;
        reports.push(report);
    }

    Ok(ReconciliationOutcome { reports })
}

async fn sync_one_repo(
    repo: &RepoConfig,
    store: &Arc<dyn IssueStore>,
    tracker: &dyn RemoteTracker,
    conventions: &Conventions,
    retry_config: &RetryConfig,
    strategy: SyncStrategy,
) -> Result<SyncResult> {
    let result = sync(
        &repo.owner,
        &repo.repo,
        repo.installation_id,
        strategy,
        tracker,
        store.as_ref(),
        conventions,
        retry_config,
    )
    .await?;
    Ok(result)
}

/// Record the outcome of one repo's sync attempt onto its `RepoConfig`
/// row, so operators can see which repos are healthy at a glance
/// (spec.md §4.D `sync_status`/`sync_error`).
async fn record_sync_status(
    repo: &RepoConfig,
    result: &Result<SyncResult>,
    store: &Arc<dyn IssueStore>,
) -> dispatch_store::Result<()> {
    let mut repo = repo.clone();
    repo.last_sync_at = Some(chrono::Utc::now());
    match result {
        Ok(result) if result.errors.is_empty() => {
            repo.sync_status = SyncStatus::Ok;
            repo.sync_error = None;
        }
        Ok(result) => {
            repo.sync_status = SyncStatus::Error;
            repo.sync_error = result.errors.first().map(|e| e.message.clone());
        }
        Err(err) => {
            repo.sync_status = SyncStatus::Error;
            repo.sync_error = Some(err.to_string());
        }
    }
    store.upsert_repo(repo).await?;
    Ok(())
}
