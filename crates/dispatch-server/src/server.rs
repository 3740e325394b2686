//! Server bootstrap: builds every component, wires them into
//! [`AppState`], and serves the combined router under CORS and tracing
//! middleware (mirrors `axon::commands::api::server::start_server`,
//! minus the dashboard/websocket concerns that don't apply here).

use dispatch_agents::AgentRegistration;
use dispatch_core::config::DispatchConfig;
use dispatch_orchestrator::{AssignmentOrchestrator, DevelopmentDeps};
use dispatch_store::{IssueStore, SqliteIssueStore};
use dispatch_sync::GithubTracker;
use dispatch_workflow::WorkflowRuntime;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::dispatcher::TokioDispatcher;
use crate::reconciler;
use crate::sandbox_backend::HttpSandboxBackend;
use crate::state::AppState;
use crate::token_provider::StaticTokenProvider;

pub struct ServerOptions {
    pub config: DispatchConfig,
    pub agents: Vec<AgentRegistration>,
    pub github_token: String,
    pub sandbox_url: String,
}

pub async fn build_state(opts: ServerOptions) -> anyhow::Result<AppState> {
    let store = Arc::new(SqliteIssueStore::connect(&opts.config.database_url).await?);
    let workflow_runtime = Arc::new(WorkflowRuntime::connect(&opts.config.database_url).await?);

    let provider = Arc::new(StaticTokenProvider::new(opts.github_token));
    let github_tracker = Arc::new(GithubTracker::new(provider, opts.config.retry)?);

    let agent_backend = Arc::new(HttpSandboxBackend::new(opts.sandbox_url, opts.config.retry)?);

    let development_deps = DevelopmentDeps {
        store: store.clone() as Arc<dyn IssueStore>,
        tracker: github_tracker.clone(),
        agent_backend: agent_backend.clone(),
        review_backend: agent_backend,
        sandbox_retry: opts.config.retry,
        pr_approval_timeout: Duration::from_secs(opts.config.pr_approval_timeout_secs),
    };
    let dispatcher = Arc::new(TokioDispatcher::new(workflow_runtime.clone(), development_deps));

    Ok(AppState {
        store: store as Arc<dyn IssueStore>,
        tracker: github_tracker,
        workflow_runtime,
        orchestrator: Arc::new(AssignmentOrchestrator::new()),
        dispatcher,
        agents: Arc::new(opts.agents),
        config: Arc::new(opts.config),
    })
}

pub async fn start_server(opts: ServerOptions) -> anyhow::Result<()> {
    let bind = opts.config.http_bind.clone();
    let state = build_state(opts).await?;

    let resumed = state.dispatcher.resume_pending().await?;
    if resumed > 0 {
        tracing::info!(resumed, "redrove in-flight development workflow instances after restart");
    }

    reconciler::spawn(state.clone(), 0);
    reconciler::spawn_assignment_loop(state.clone());

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any).max_age(Duration::from_secs(3600));

    let app = crate::routes::create_router(state).layer(TraceLayer::new_for_http()).layer(cors);

    tracing::info!(%bind, "dispatchd listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
