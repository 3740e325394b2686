use async_trait::async_trait;
use chrono::Utc;
use dispatch_codec::RemotePayload;
use dispatch_core::config::{Conventions, RetryConfig, SyncStrategy};
use dispatch_core::{RepoConfig, SyncStatus};
use dispatch_orchestrator::{run_reconciliation_workflow, ReconciliationDeps, ReconciliationParams};
use dispatch_store::{IssueStore, SqliteIssueStore};
use dispatch_sync::{RemoteIssue, RemoteIssueRef, RemoteTracker};
use dispatch_workflow::WorkflowRuntime;
use std::sync::Arc;

struct FakeTracker;

#[async_trait]
impl RemoteTracker for FakeTracker {
    async fn list_issues(&self, _owner: &str, repo: &str, _installation_id: i64) -> dispatch_sync::Result<Vec<RemoteIssue>> {
        let now = Utc::now();
        Ok(vec![RemoteIssue {
            number: 1,
            url: format!("https://example.test/{repo}/issues/1"),
            updated_at: now,
            closed_at: None,
            payload: RemotePayload {
                title: "Remote issue".to_string(),
                body: String::new(),
                labels: Vec::new(),
                assignees: Vec::new(),
                state: dispatch_codec::RemoteState::Open,
            },
        }])
    }
    async fn get_issue(&self, _owner: &str, _repo: &str, _installation_id: i64, _number: u64) -> dispatch_sync::Result<RemoteIssue> {
        unimplemented!()
    }
    async fn create_issue(
        &self,
        _owner: &str,
        _repo: &str,
        _installation_id: i64,
        _payload: &RemotePayload,
    ) -> dispatch_sync::Result<RemoteIssueRef> {
        unimplemented!()
    }
    async fn update_issue(
        &self,
        _owner: &str,
        _repo: &str,
        _installation_id: i64,
        _number: u64,
        _payload: &RemotePayload,
    ) -> dispatch_sync::Result<RemoteIssueRef> {
        unimplemented!()
    }
}

#[tokio::test]
async fn reconciles_every_sync_enabled_repo_and_records_status() {
    let store = SqliteIssueStore::connect("sqlite::memory:").await.unwrap();
    store
        .upsert_repo(RepoConfig {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            installation_id: 7,
            sync_enabled: true,
            last_sync_at: None,
            sync_status: SyncStatus::Never,
            sync_error: None,
        })
        .await
        .unwrap();
    store
        .upsert_repo(RepoConfig {
            owner: "acme".to_string(),
            repo: "gadgets".to_string(),
            installation_id: 8,
            sync_enabled: false,
            last_sync_at: None,
            sync_status: SyncStatus::Never,
            sync_error: None,
        })
        .await
        .unwrap();

    let rt = WorkflowRuntime::connect("sqlite::memory:").await.unwrap();
    let deps = ReconciliationDeps {
        store: Arc::new(store),
        tracker: Arc::new(FakeTracker),
        conventions: Conventions::default(),
        retry_config: RetryConfig::default(),
    };

    let outcome = run_reconciliation_workflow(&rt, "reconcile-1", deps, ReconciliationParams { strategy: SyncStrategy::NewestWins })
        .await
        .unwrap();

    assert_eq!(outcome.reports.len(), 1, "only the sync-enabled repo is reconciled");
    let report = &outcome.reports[0];
    assert_eq!(report.repo, "acme/widgets");
    assert_eq!(report.created, 1);
    assert_eq!(report.errors, 0);
}
