//! Background reconciliation scheduler (spec.md §4.J): ticks every
//! `reconciliation_interval_secs` and runs the Reconciliation Workflow
//! across every sync-enabled repo, the same
//! `tokio::time::interval`-driven background task shape
//! `axon::commands::api::server::start_server` uses for its rate-limiter
//! sweep.

use dispatch_orchestrator::{run_reconciliation_workflow, ReconciliationDeps, ReconciliationParams};
use dispatch_workflow::WorkflowRuntime;
use std::time::Duration;

use crate::state::AppState;

pub fn spawn(state: AppState, instance_seed: u64) {
    let interval_secs = state.config.reconciliation_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        let mut tick: u64 = instance_seed;
        loop {
            interval.tick().await;
            tick += 1;
            run_once(&state, tick).await;
        }
    });
}

async fn run_once(state: &AppState, tick: u64) {
    let deps = ReconciliationDeps {
        store: state.store.clone(),
        tracker: state.tracker.clone(),
        conventions: state.config.conventions.clone(),
        retry_config: state.config.retry,
    };
    let instance_id = format!("reconcile-{tick}");
    let runtime: &WorkflowRuntime = &state.workflow_runtime;
    match run_reconciliation_workflow(runtime, &instance_id, deps, ReconciliationParams { strategy: state.config.sync_strategy }).await {
        Ok(outcome) => tracing::info!(%instance_id, repos = outcome.reports.len(), "reconciliation tick complete"),
        Err(err) => tracing::error!(%instance_id, %err, "reconciliation tick failed"),
    }
}

pub fn spawn_assignment_loop(state: AppState) {
    let interval_secs = state.config.reconciliation_interval_secs.max(1).min(60);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            assign_once(&state).await;
        }
    });
}

async fn assign_once(state: &AppState) {
    let repos = match state.store.list_repos(true).await {
        Ok(repos) => repos,
        Err(err) => {
            tracing::error!(%err, "failed to list repos for assignment sweep");
            return;
        }
    };
    for repo in repos {
        let result = state
            .orchestrator
            .assign_ready_issues(state.store.as_ref(), &state.agents, state.dispatcher.as_ref(), &repo.owner, &repo.repo, repo.installation_id)
            .await;
        match result {
            Ok(assignments) if !assignments.is_empty() => {
                tracing::info!(repo = %repo.full_name(), assigned = assignments.len(), "assigned ready issues");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(repo = %repo.full_name(), %err, "assignment sweep failed"),
        }
    }
}
