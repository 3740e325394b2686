//! Shared application state, the `AppState` every route handler takes
//! through axum's `State` extractor (modeled on
//! `axon::commands::api::routes::AppState`).

use dispatch_agents::AgentRegistration;
use dispatch_core::config::DispatchConfig;
use dispatch_orchestrator::AssignmentOrchestrator;
use dispatch_store::IssueStore;
use dispatch_sync::RemoteTracker;
use dispatch_workflow::WorkflowRuntime;
use std::sync::Arc;

use crate::dispatcher::TokioDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IssueStore>,
    pub tracker: Arc<dyn RemoteTracker>,
    pub workflow_runtime: Arc<WorkflowRuntime>,
    pub orchestrator: Arc<AssignmentOrchestrator>,
    pub dispatcher: Arc<TokioDispatcher>,
    pub agents: Arc<Vec<AgentRegistration>>,
    pub config: Arc<DispatchConfig>,
}
