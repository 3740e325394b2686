use async_trait::async_trait;
use chrono::Utc;
use dispatch_core::config::RetryConfig;
use dispatch_core::{Issue, IssueId, IssueStatus};
use dispatch_orchestrator::{
    start_development_workflow, AgentExecutionBackend, AgentReviewBackend, DevelopmentDeps, DevelopmentOutcome,
    DevelopmentTrigger, ExecuteInput, ExecuteOutput, ReviewOutput,
};
use dispatch_store::{IssueStore, SqliteIssueStore};
use dispatch_sync::{PrTracker, PullRequestRef, RemoteIssue, RemoteIssueRef, RemoteTracker};
use dispatch_workflow::WorkflowRuntime;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FakeTracker {
    pr_number: u64,
    merged: Mutex<Vec<u64>>,
    comments: Mutex<Vec<String>>,
}

impl FakeTracker {
    fn new() -> Self {
        Self { pr_number: 101, merged: Mutex::new(Vec::new()), comments: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl RemoteTracker for FakeTracker {
    async fn list_issues(&self, _owner: &str, _repo: &str, _installation_id: i64) -> dispatch_sync::Result<Vec<RemoteIssue>> {
        Ok(Vec::new())
    }
    async fn get_issue(&self, _owner: &str, _repo: &str, _installation_id: i64, _number: u64) -> dispatch_sync::Result<RemoteIssue> {
        unimplemented!("not exercised by the development workflow")
    }
    async fn create_issue(
        &self,
        _owner: &str,
        _repo: &str,
        _installation_id: i64,
        _payload: &dispatch_codec::RemotePayload,
    ) -> dispatch_sync::Result<RemoteIssueRef> {
        unimplemented!("not exercised by the development workflow")
    }
    async fn update_issue(
        &self,
        _owner: &str,
        _repo: &str,
        _installation_id: i64,
        _number: u64,
        _payload: &dispatch_codec::RemotePayload,
    ) -> dispatch_sync::Result<RemoteIssueRef> {
        unimplemented!("not exercised by the development workflow")
    }
}

#[async_trait]
impl PrTracker for FakeTracker {
    async fn open_pr(
        &self,
        _owner: &str,
        _repo: &str,
        _installation_id: i64,
        _head_branch: &str,
        _base_branch: &str,
        _title: &str,
        _body: &str,
    ) -> dispatch_sync::Result<PullRequestRef> {
        Ok(PullRequestRef { number: self.pr_number, url: format!("https://example.test/pulls/{}", self.pr_number) })
    }
    async fn merge_pr(&self, _owner: &str, _repo: &str, _installation_id: i64, pr_number: u64) -> dispatch_sync::Result<()> {
        self.merged.lock().unwrap().push(pr_number);
        Ok(())
    }
    async fn create_comment(
        &self,
        _owner: &str,
        _repo: &str,
        _installation_id: i64,
        _issue_number: u64,
        body: &str,
    ) -> dispatch_sync::Result<()> {
        self.comments.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

struct FakeAgentBackend {
    files_changed: u32,
    calls: AtomicU32,
}

#[async_trait]
impl AgentExecutionBackend for FakeAgentBackend {
    async fn execute(&self, input: ExecuteInput) -> dispatch_orchestrator::Result<ExecuteOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecuteOutput {
            diff: format!("diff for {}", input.task),
            files_changed: self.files_changed,
            pushed_branch: input.branch,
            test_results: Some("ok".to_string()),
        })
    }
}

struct FakeReviewBackend {
    approved: bool,
}

#[async_trait]
impl AgentReviewBackend for FakeReviewBackend {
    async fn review(&self, diff: &str, _context: Option<&str>) -> dispatch_orchestrator::Result<ReviewOutput> {
        Ok(ReviewOutput {
            approved: self.approved,
            summary: format!("reviewed: {diff}"),
            comments: if self.approved { Vec::new() } else { vec!["please add a test".to_string()] },
        })
    }
}

async fn store() -> SqliteIssueStore {
    SqliteIssueStore::connect("sqlite::memory:").await.unwrap()
}

fn trigger(issue_id: &IssueId) -> DevelopmentTrigger {
    DevelopmentTrigger {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        installation_id: 7,
        issue_id: issue_id.clone(),
        agent_id: "agent-1".to_string(),
        context: None,
    }
}

#[tokio::test]
async fn happy_path_merges_pr_and_closes_issue() {
    let store = store().await;
    let issue = store.create_issue(Issue::new(IssueId::new("iss-1"), "Add retry logic")).await.unwrap();

    let rt = WorkflowRuntime::connect("sqlite::memory:").await.unwrap();
    rt.send_event("dev-iss-1", "pr_approved", serde_json::json!({})).await.unwrap();

    let tracker: Arc<FakeTracker> = Arc::new(FakeTracker::new());
    let deps = DevelopmentDeps {
        store: Arc::new(store),
        tracker: tracker.clone(),
        agent_backend: Arc::new(FakeAgentBackend { files_changed: 3, calls: AtomicU32::new(0) }),
        review_backend: Arc::new(FakeReviewBackend { approved: true }),
        sandbox_retry: RetryConfig::default(),
        pr_approval_timeout: Duration::from_secs(5),
    };

    let outcome = start_development_workflow(&rt, "dev-iss-1", deps, trigger(&issue.id)).await.unwrap();
    match outcome {
        DevelopmentOutcome::Done { pr_number, unblocked, .. } => {
            assert_eq!(pr_number, 101);
            assert!(unblocked.is_empty());
        }
        other => panic!("expected Done, got {other:?}"),
    }
    assert_eq!(*tracker.merged.lock().unwrap(), vec![101]);
}

#[tokio::test]
async fn no_changes_closes_issue_as_noop() {
    let store = store().await;
    let issue = store.create_issue(Issue::new(IssueId::new("iss-2"), "Investigate flaky test")).await.unwrap();

    let rt = WorkflowRuntime::connect("sqlite::memory:").await.unwrap();
    let store = Arc::new(store);
    let deps = DevelopmentDeps {
        store: store.clone(),
        tracker: Arc::new(FakeTracker::new()),
        agent_backend: Arc::new(FakeAgentBackend { files_changed: 0, calls: AtomicU32::new(0) }),
        review_backend: Arc::new(FakeReviewBackend { approved: true }),
        sandbox_retry: RetryConfig::default(),
        pr_approval_timeout: Duration::from_secs(5),
    };

    let outcome = start_development_workflow(&rt, "dev-iss-2", deps, trigger(&issue.id)).await.unwrap();
    assert!(matches!(outcome, DevelopmentOutcome::NoOp { .. }));
    let closed = store.get_issue(&issue.id).await.unwrap();
    assert!(closed.is_closed());
}

#[tokio::test]
async fn rejected_review_blocks_issue_and_posts_comments() {
    let store = store().await;
    let mut issue = Issue::new(IssueId::new("iss-3"), "Add pagination");
    issue.external_ref = Some(dispatch_core::ExternalRef {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        number: 42,
        url: "https://example.test/issues/42".to_string(),
    });
    let issue = store.create_issue(issue).await.unwrap();

    let rt = WorkflowRuntime::connect("sqlite::memory:").await.unwrap();
    let store = Arc::new(store);
    let tracker = Arc::new(FakeTracker::new());
    let deps = DevelopmentDeps {
        store: store.clone(),
        tracker: tracker.clone(),
        agent_backend: Arc::new(FakeAgentBackend { files_changed: 2, calls: AtomicU32::new(0) }),
        review_backend: Arc::new(FakeReviewBackend { approved: false }),
        sandbox_retry: RetryConfig::default(),
        pr_approval_timeout: Duration::from_secs(5),
    };

    let err = start_development_workflow(&rt, "dev-iss-3", deps, trigger(&issue.id)).await.unwrap_err();
    assert!(matches!(err, dispatch_orchestrator::OrchestratorError::Workflow(_)));
    let blocked = store.get_issue(&issue.id).await.unwrap();
    assert_eq!(blocked.status, IssueStatus::Blocked);
    assert_eq!(tracker.comments.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn approval_timeout_blocks_issue() {
    let store = store().await;
    let issue = store.create_issue(Issue::new(IssueId::new("iss-4"), "Refactor codec")).await.unwrap();

    let rt = WorkflowRuntime::connect("sqlite::memory:").await.unwrap();
    let store = Arc::new(store);
    let deps = DevelopmentDeps {
        store: store.clone(),
        tracker: Arc::new(FakeTracker::new()),
        agent_backend: Arc::new(FakeAgentBackend { files_changed: 1, calls: AtomicU32::new(0) }),
        review_backend: Arc::new(FakeReviewBackend { approved: true }),
        sandbox_retry: RetryConfig::default(),
        pr_approval_timeout: Duration::from_millis(50),
    };

    let err = start_development_workflow(&rt, "dev-iss-4", deps, trigger(&issue.id)).await.unwrap_err();
    assert!(matches!(err, dispatch_orchestrator::OrchestratorError::Workflow(_)));
    let blocked = store.get_issue(&issue.id).await.unwrap();
    assert_eq!(blocked.status, IssueStatus::Blocked);
}

#[tokio::test]
async fn replay_does_not_re_invoke_agent_backend() {
    let store = store().await;
    let issue = store.create_issue(Issue::new(IssueId::new("iss-5"), "Add metrics")).await.unwrap();

    let rt = WorkflowRuntime::connect("sqlite::memory:").await.unwrap();
    rt.send_event("dev-iss-5", "pr_approved", serde_json::json!({})).await.unwrap();
    let store = Arc::new(store);
    let backend = Arc::new(FakeAgentBackend { files_changed: 1, calls: AtomicU32::new(0) });
    let deps = DevelopmentDeps {
        store: store.clone(),
        tracker: Arc::new(FakeTracker::new()),
        agent_backend: backend.clone(),
        review_backend: Arc::new(FakeReviewBackend { approved: true }),
        sandbox_retry: RetryConfig::default(),
        pr_approval_timeout: Duration::from_secs(5),
    };

    start_development_workflow(&rt, "dev-iss-5", deps, trigger(&issue.id)).await.unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

    // Re-running the same instance id replays every step from its
    // persisted record instead of invoking the backend a second time.
    let deps_again = DevelopmentDeps {
        store: store.clone(),
        tracker: Arc::new(FakeTracker::new()),
        agent_backend: backend.clone(),
        review_backend: Arc::new(FakeReviewBackend { approved: true }),
        sandbox_retry: RetryConfig::default(),
        pr_approval_timeout: Duration::from_secs(5),
    };
    start_development_workflow(&rt, "dev-iss-5", deps_again, trigger(&issue.id)).await.unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1, "replay must not re-invoke the agent backend");
}
