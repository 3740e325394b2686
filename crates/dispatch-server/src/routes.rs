//! REST routes (spec.md §6): the webhook endpoint lives in
//! [`crate::webhook`]; this module carries the read surface over the
//! store and the explicit-sync trigger, modeled on
//! `axon::commands::api::routes::create_routes`.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dispatch_core::{Issue, IssueId, IssueStatus, IssueType};
use dispatch_store::{IssueFilter, WebhookErrorRecord};
use dispatch_sync::sync;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use crate::webhook::github_webhook;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/issues", get(list_issues))
        .route("/api/v1/issues/{id}", get(get_issue))
        .route("/api/v1/sync/{owner}/{repo}", post(trigger_sync))
        .route("/api/v1/webhooks/errors", get(list_webhook_errors))
        .route("/webhooks/github", post(github_webhook))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct ListIssuesQuery {
    status: Option<String>,
    assignee: Option<String>,
    issue_type: Option<String>,
    label: Option<String>,
    updated_since: Option<DateTime<Utc>>,
}

fn parse_status(raw: &str) -> Result<IssueStatus, ApiError> {
    match raw {
        "open" => Ok(IssueStatus::Open),
        "in_progress" => Ok(IssueStatus::InProgress),
        "blocked" => Ok(IssueStatus::Blocked),
        "closed" => Ok(IssueStatus::Closed),
        other => Err(ApiError::BadRequest(format!("unknown status '{other}'"))),
    }
}

fn parse_issue_type(raw: &str) -> Result<IssueType, ApiError> {
    match raw {
        "bug" => Ok(IssueType::Bug),
        "feature" => Ok(IssueType::Feature),
        "task" => Ok(IssueType::Task),
        "epic" => Ok(IssueType::Epic),
        "chore" => Ok(IssueType::Chore),
        other => Err(ApiError::BadRequest(format!("unknown issue type '{other}'"))),
    }
}

async fn list_issues(State(state): State<AppState>, Query(query): Query<ListIssuesQuery>) -> Result<Json<Vec<Issue>>, ApiError> {
    let filter = IssueFilter {
        status: query.status.as_deref().map(parse_status).transpose()?,
        assignee: query.assignee,
        issue_type: query.issue_type.as_deref().map(parse_issue_type).transpose()?,
        label: query.label,
        updated_since: query.updated_since,
    };
    let issues = state.store.list_issues(&filter).await.map_err(ApiError::from)?;
    Ok(Json(issues))
}

async fn get_issue(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Issue>, ApiError> {
    let issue = state.store.get_issue(&IssueId::new(id)).await.map_err(ApiError::from)?;
    Ok(Json(issue))
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    created: usize,
    updated: usize,
    conflicts: usize,
    errors: usize,
}

async fn trigger_sync(State(state): State<AppState>, Path((owner, repo)): Path<(String, String)>) -> Result<Json<SyncResponse>, ApiError> {
    let repos = state.store.list_repos(false).await.map_err(ApiError::from)?;
    let repo_config = repos
        .into_iter()
        .find(|r| r.owner == owner && r.repo == repo)
        .ok_or_else(|| ApiError::NotFound(format!("repo {owner}/{repo} is not registered")))?;

    let result = sync(
        &owner,
        &repo,
        repo_config.installation_id,
        state.config.sync_strategy,
        state.tracker.as_ref(),
        state.store.as_ref(),
        &state.config.conventions,
        &state.config.retry,
    )
    .await
    .map_err(ApiError::from)?;

    Ok(Json(SyncResponse {
        created: result.created.len(),
        updated: result.updated.len(),
        conflicts: result.conflicts.len(),
        errors: result.errors.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct WebhookErrorsQuery {
    limit: Option<i64>,
}

async fn list_webhook_errors(
    State(state): State<AppState>,
    Query(query): Query<WebhookErrorsQuery>,
) -> Result<Json<Vec<WebhookErrorRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let errors = state.store.list_webhook_errors(limit).await.map_err(ApiError::from)?;
    Ok(Json(errors))
}
